//! Bytecode assembly, `code_item` and `debug_info_item` serialization.
//!
//! Instructions address each other by index. Assembly picks the narrowest
//! format for every instruction, then grows `goto` formats until all branch
//! offsets fit; sizes only ever grow, so the loop terminates.

use super::output::{write_sleb128, write_uleb128, write_uleb128p1, ByteOutput};
use crate::error::{DexError, DexResult};
use crate::pool::SortedPool;
use dexon_common::InternalError;
use dexon_ir::{
    BinaryOp, Code, DebugInfo, FieldOp, IfTest, Instruction, InvokeKind, MoveKind, ValueKind,
};
use indexmap::IndexMap;

/// Instructions laid out as code units.
pub(crate) struct AssembledCode {
    pub(crate) insns: Vec<u16>,
    /// Code-unit address of every instruction, followed by the end address.
    pub(crate) addresses: Vec<u32>,
}

/// Where an assembly error is reported.
pub(crate) struct Site<'a> {
    pub(crate) owner: &'a str,
    pub(crate) method: &'a str,
}

impl Site<'_> {
    fn malformed(&self, reason: impl std::fmt::Display) -> DexError {
        DexError::malformed(self.owner, format!("{}: {}", self.method, reason))
    }
}

fn index16(value: u32) -> DexResult<u16> {
    u16::try_from(value).map_err(|_| {
        DexError::Internal(InternalError::new(format!(
            "index {value} does not fit a 16-bit operand"
        )))
    })
}

fn fits_i8(v: i64) -> bool {
    i8::try_from(v).is_ok()
}

fn fits_i16(v: i64) -> bool {
    i16::try_from(v).is_ok()
}

fn fits_i32(v: i64) -> bool {
    i32::try_from(v).is_ok()
}

fn op_aa(op: u8, aa: u8) -> u16 {
    u16::from(op) | (u16::from(aa) << 8)
}

fn op_ab(op: u8, a: u8, b: u8) -> u16 {
    u16::from(op) | (u16::from(a & 0xf) << 8) | (u16::from(b & 0xf) << 12)
}

fn move_offset(kind: MoveKind) -> u8 {
    match kind {
        MoveKind::Single => 0,
        MoveKind::Wide => 1,
        MoveKind::Object => 2,
    }
}

fn value_offset(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Int => 0,
        ValueKind::Wide => 1,
        ValueKind::Object => 2,
        ValueKind::Boolean => 3,
        ValueKind::Byte => 4,
        ValueKind::Char => 5,
        ValueKind::Short => 6,
    }
}

fn invoke_offset(kind: InvokeKind) -> u8 {
    match kind {
        InvokeKind::Virtual => 0,
        InvokeKind::Super => 1,
        InvokeKind::Direct => 2,
        InvokeKind::Static => 3,
        InvokeKind::Interface => 4,
    }
}

fn if_offset(test: IfTest) -> u8 {
    match test {
        IfTest::Eq => 0,
        IfTest::Ne => 1,
        IfTest::Lt => 2,
        IfTest::Ge => 3,
        IfTest::Gt => 4,
        IfTest::Le => 5,
    }
}

fn binop_offset(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Rem => 4,
        BinaryOp::And => 5,
        BinaryOp::Or => 6,
        BinaryOp::Xor => 7,
        BinaryOp::Shl => 8,
        BinaryOp::Shr => 9,
        BinaryOp::Ushr => 10,
    }
}

fn jumbo(pool: &SortedPool, value: &str, force_jumbo: bool) -> DexResult<bool> {
    Ok(force_jumbo || pool.string(value)? > 0xffff)
}

/// Size in code units. `goto` starts at its narrowest form.
fn unit_size(insn: &Instruction, pool: &SortedPool, force_jumbo: bool) -> DexResult<u32> {
    Ok(match insn {
        Instruction::Nop
        | Instruction::MoveResult { .. }
        | Instruction::MoveException { .. }
        | Instruction::ReturnVoid
        | Instruction::Return { .. }
        | Instruction::ArrayLength { .. }
        | Instruction::Throw { .. }
        | Instruction::Goto { .. } => 1,
        Instruction::Move { dst, src, .. } => {
            if *dst <= 15 && *src <= 15 {
                1
            } else if *dst <= 255 {
                2
            } else {
                3
            }
        }
        Instruction::Const { dst, value } => {
            let v = i64::from(*value);
            if *dst <= 15 && (-8..=7).contains(&v) {
                1
            } else if fits_i16(v) || v & 0xffff == 0 {
                2
            } else {
                3
            }
        }
        Instruction::ConstWide { value, .. } => {
            if fits_i16(*value) || value & 0xffff_ffff_ffff == 0 {
                2
            } else if fits_i32(*value) {
                3
            } else {
                5
            }
        }
        Instruction::ConstString { value, .. } => {
            if jumbo(pool, value, force_jumbo)? {
                3
            } else {
                2
            }
        }
        Instruction::ConstClass { .. }
        | Instruction::ConstMethodHandle { .. }
        | Instruction::ConstMethodType { .. }
        | Instruction::CheckCast { .. }
        | Instruction::InstanceOf { .. }
        | Instruction::NewInstance { .. }
        | Instruction::NewArray { .. }
        | Instruction::If { .. }
        | Instruction::IfZero { .. }
        | Instruction::InstanceField { .. }
        | Instruction::StaticField { .. }
        | Instruction::BinaryOp { .. } => 2,
        Instruction::Invoke { .. }
        | Instruction::InvokeRange { .. }
        | Instruction::InvokeCustom { .. } => 3,
    })
}

fn goto_size(delta: i64) -> u32 {
    if delta == 0 {
        // Only goto/32 may branch to itself.
        3
    } else if fits_i8(delta) {
        1
    } else if fits_i16(delta) {
        2
    } else {
        3
    }
}

fn addresses_of(sizes: &[u32]) -> Vec<u32> {
    let mut addresses = Vec::with_capacity(sizes.len() + 1);
    let mut address = 0;
    for size in sizes {
        addresses.push(address);
        address += size;
    }
    addresses.push(address);
    addresses
}

/// Lays out a method body as code units.
pub(crate) fn assemble(
    code: &Code,
    pool: &SortedPool,
    force_jumbo: bool,
    site: &Site<'_>,
) -> DexResult<AssembledCode> {
    let mut sizes = code
        .instructions
        .iter()
        .map(|insn| unit_size(insn, pool, force_jumbo))
        .collect::<DexResult<Vec<_>>>()?;

    let addresses = loop {
        let addresses = addresses_of(&sizes);
        let mut grown = false;
        for (i, insn) in code.instructions.iter().enumerate() {
            if let Instruction::Goto { target } = insn {
                let delta = i64::from(addresses[*target as usize]) - i64::from(addresses[i]);
                let needed = goto_size(delta);
                if needed > sizes[i] {
                    sizes[i] = needed;
                    grown = true;
                }
            }
        }
        if !grown {
            break addresses;
        }
    };

    let mut insns = Vec::with_capacity(addresses[addresses.len() - 1] as usize);
    for (i, insn) in code.instructions.iter().enumerate() {
        let start = insns.len();
        let emitter = Emitter {
            pool,
            force_jumbo,
            site,
            here: addresses[i],
            addresses: &addresses,
            width: sizes[i],
        };
        emitter.emit(insn, &mut insns)?;
        if insns.len() - start != sizes[i] as usize {
            return Err(DexError::Internal(InternalError::new(format!(
                "{} instruction {i} assembled to {} units, laid out as {}",
                site.method,
                insns.len() - start,
                sizes[i]
            ))));
        }
    }
    Ok(AssembledCode { insns, addresses })
}

struct Emitter<'p, 's> {
    pool: &'p SortedPool,
    force_jumbo: bool,
    site: &'s Site<'s>,
    here: u32,
    addresses: &'p [u32],
    width: u32,
}

impl Emitter<'_, '_> {
    fn delta(&self, target: u32) -> i64 {
        i64::from(self.addresses[target as usize]) - i64::from(self.here)
    }

    fn conditional_offset(&self, target: u32) -> DexResult<u16> {
        let delta = self.delta(target);
        if delta == 0 || !fits_i16(delta) {
            return Err(self
                .site
                .malformed(format!("conditional branch offset {delta} does not fit 16 bits")));
        }
        Ok(delta as i16 as u16)
    }

    fn emit(&self, insn: &Instruction, out: &mut Vec<u16>) -> DexResult<()> {
        let pool = self.pool;
        match insn {
            Instruction::Nop => out.push(0x0000),
            Instruction::Move { kind, dst, src } => {
                let base = 0x01 + 3 * move_offset(*kind);
                if *dst <= 15 && *src <= 15 {
                    out.push(op_ab(base, *dst as u8, *src as u8));
                } else if *dst <= 255 {
                    out.extend([op_aa(base + 1, *dst as u8), *src]);
                } else {
                    out.extend([u16::from(base + 2), *dst, *src]);
                }
            }
            Instruction::MoveResult { kind, dst } => {
                out.push(op_aa(0x0a + move_offset(*kind), *dst))
            }
            Instruction::MoveException { dst } => out.push(op_aa(0x0d, *dst)),
            Instruction::ReturnVoid => out.push(0x000e),
            Instruction::Return { kind, src } => out.push(op_aa(0x0f + move_offset(*kind), *src)),
            Instruction::Const { dst, value } => {
                let v = *value;
                if *dst <= 15 && (-8..=7).contains(&v) {
                    out.push(op_ab(0x12, *dst, v as u8));
                } else if fits_i16(i64::from(v)) {
                    out.extend([op_aa(0x13, *dst), v as i16 as u16]);
                } else if v & 0xffff == 0 {
                    out.extend([op_aa(0x15, *dst), (v >> 16) as u16]);
                } else {
                    let bits = v as u32;
                    out.extend([op_aa(0x14, *dst), bits as u16, (bits >> 16) as u16]);
                }
            }
            Instruction::ConstWide { dst, value } => {
                let v = *value;
                if fits_i16(v) {
                    out.extend([op_aa(0x16, *dst), v as i16 as u16]);
                } else if v & 0xffff_ffff_ffff == 0 {
                    out.extend([op_aa(0x19, *dst), (v >> 48) as u16]);
                } else if fits_i32(v) {
                    let bits = v as u32;
                    out.extend([op_aa(0x17, *dst), bits as u16, (bits >> 16) as u16]);
                } else {
                    let bits = v as u64;
                    out.push(op_aa(0x18, *dst));
                    out.extend((0..4).map(|i| (bits >> (16 * i)) as u16));
                }
            }
            Instruction::ConstString { dst, value } => {
                let index = pool.string(value)?;
                if jumbo(pool, value, self.force_jumbo)? {
                    out.extend([op_aa(0x1b, *dst), index as u16, (index >> 16) as u16]);
                } else {
                    out.extend([op_aa(0x1a, *dst), index16(index)?]);
                }
            }
            Instruction::ConstClass { dst, type_ } => {
                out.extend([op_aa(0x1c, *dst), index16(pool.type_(type_)?)?])
            }
            Instruction::ConstMethodHandle { dst, handle } => {
                out.extend([op_aa(0xfe, *dst), index16(pool.method_handle(handle)?)?])
            }
            Instruction::ConstMethodType { dst, proto } => {
                out.extend([op_aa(0xff, *dst), index16(pool.proto(proto)?)?])
            }
            Instruction::CheckCast { reg, type_ } => {
                out.extend([op_aa(0x1f, *reg), index16(pool.type_(type_)?)?])
            }
            Instruction::InstanceOf { dst, object, type_ } => {
                out.extend([op_ab(0x20, *dst, *object), index16(pool.type_(type_)?)?])
            }
            Instruction::ArrayLength { dst, array } => out.push(op_ab(0x21, *dst, *array)),
            Instruction::NewInstance { dst, type_ } => {
                out.extend([op_aa(0x22, *dst), index16(pool.type_(type_)?)?])
            }
            Instruction::NewArray { dst, size, type_ } => {
                out.extend([op_ab(0x23, *dst, *size), index16(pool.type_(type_)?)?])
            }
            Instruction::Throw { src } => out.push(op_aa(0x27, *src)),
            Instruction::Goto { target } => {
                let delta = self.delta(*target);
                match self.width {
                    1 => out.push(op_aa(0x28, delta as i8 as u8)),
                    2 => out.extend([0x0029, delta as i16 as u16]),
                    _ => {
                        let bits = delta as i32 as u32;
                        out.extend([0x002a, bits as u16, (bits >> 16) as u16]);
                    }
                }
            }
            Instruction::If { test, a, b, target } => {
                let offset = self.conditional_offset(*target)?;
                out.extend([op_ab(0x32 + if_offset(*test), *a, *b), offset]);
            }
            Instruction::IfZero { test, reg, target } => {
                let offset = self.conditional_offset(*target)?;
                out.extend([op_aa(0x38 + if_offset(*test), *reg), offset]);
            }
            Instruction::InstanceField {
                op,
                kind,
                value,
                object,
                field,
            } => {
                let base = match op {
                    FieldOp::Get => 0x52,
                    FieldOp::Put => 0x59,
                };
                out.extend([
                    op_ab(base + value_offset(*kind), *value, *object),
                    index16(pool.field(field)?)?,
                ]);
            }
            Instruction::StaticField {
                op,
                kind,
                value,
                field,
            } => {
                let base = match op {
                    FieldOp::Get => 0x60,
                    FieldOp::Put => 0x67,
                };
                out.extend([
                    op_aa(base + value_offset(*kind), *value),
                    index16(pool.field(field)?)?,
                ]);
            }
            Instruction::Invoke { kind, method, args } => {
                let index = index16(pool.method(method)?)?;
                emit_35c(out, 0x6e + invoke_offset(*kind), index, args);
            }
            Instruction::InvokeRange {
                kind,
                method,
                first,
                count,
            } => {
                let index = index16(pool.method(method)?)?;
                out.extend([op_aa(0x74 + invoke_offset(*kind), *count), index, *first]);
            }
            Instruction::InvokeCustom { call_site, args } => {
                let index = index16(pool.call_site(call_site)?)?;
                emit_35c(out, 0xfc, index, args);
            }
            Instruction::BinaryOp { op, dst, a, b } => {
                out.extend([
                    op_aa(0x90 + binop_offset(*op), *dst),
                    u16::from(*a) | (u16::from(*b) << 8),
                ]);
            }
        }
        Ok(())
    }
}

/// Format 35c: `A|G|op BBBB F|E|D|C`.
fn emit_35c(out: &mut Vec<u16>, op: u8, index: u16, args: &[u8]) {
    let reg = |i: usize| u16::from(args.get(i).copied().unwrap_or(0) & 0xf);
    let count = args.len() as u16;
    out.push(u16::from(op) | (reg(4) << 8) | (count << 12));
    out.push(index);
    out.push(reg(0) | (reg(1) << 4) | (reg(2) << 8) | (reg(3) << 12));
}

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_FIRST_SPECIAL: i64 = 0x0a;
const DBG_LINE_BASE: i64 = -4;
const DBG_LINE_RANGE: i64 = 15;

/// Serializes a `debug_info_item` for an assembled body.
pub(crate) fn write_debug_info(
    debug: &DebugInfo,
    addresses: &[u32],
    pool: &SortedPool,
) -> DexResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_uleb128(&mut buf, debug.line_start);
    write_uleb128(&mut buf, debug.parameter_names.len() as u32);
    for name in &debug.parameter_names {
        let index = name.as_deref().map(|n| pool.string(n)).transpose()?;
        write_uleb128p1(&mut buf, index);
    }

    let mut address = 0i64;
    let mut line = i64::from(debug.line_start);
    for position in &debug.positions {
        let mut address_diff = i64::from(addresses[position.insn as usize]) - address;
        let mut line_diff = i64::from(position.line) - line;
        if !(DBG_LINE_BASE..DBG_LINE_BASE + DBG_LINE_RANGE).contains(&line_diff) {
            buf.push(DBG_ADVANCE_LINE);
            write_sleb128(&mut buf, line_diff as i32);
            line_diff = 0;
        }
        let mut opcode =
            (line_diff - DBG_LINE_BASE) + DBG_LINE_RANGE * address_diff + DBG_FIRST_SPECIAL;
        if opcode > 0xff {
            buf.push(DBG_ADVANCE_PC);
            write_uleb128(&mut buf, address_diff as u32);
            address_diff = 0;
            opcode = (line_diff - DBG_LINE_BASE) + DBG_FIRST_SPECIAL;
        }
        buf.push(opcode as u8);
        address += address_diff;
        line += line_diff;
    }
    buf.push(DBG_END_SEQUENCE);
    Ok(buf)
}

/// Writes a `code_item` (the caller aligns to 4 bytes first).
pub(crate) fn write_code_item(
    out: &mut ByteOutput,
    code: &Code,
    assembled: &AssembledCode,
    debug_info_off: u32,
    pool: &SortedPool,
    site: &Site<'_>,
) -> DexResult<()> {
    let addresses = &assembled.addresses;

    // Identical handler lists are written once and shared.
    let mut handlers: IndexMap<(Vec<(u32, u32)>, Option<u32>), usize> = IndexMap::new();
    let mut try_handlers = Vec::with_capacity(code.tries.len());
    for block in &code.tries {
        let typed = block
            .handlers
            .iter()
            .map(|h| -> DexResult<_> {
                Ok((pool.type_(&h.exception_type)?, addresses[h.target as usize]))
            })
            .collect::<DexResult<Vec<_>>>()?;
        let key = (typed, block.catch_all.map(|t| addresses[t as usize]));
        let next = handlers.len();
        let slot = *handlers.entry(key).or_insert(next);
        try_handlers.push(slot);
    }

    let mut handler_list = Vec::new();
    let mut handler_offsets = Vec::with_capacity(handlers.len());
    if !handlers.is_empty() {
        write_uleb128(&mut handler_list, handlers.len() as u32);
        for (typed, catch_all) in handlers.keys() {
            handler_offsets.push(handler_list.len());
            let size = typed.len() as i32;
            write_sleb128(&mut handler_list, if catch_all.is_some() { -size } else { size });
            for (type_idx, address) in typed {
                write_uleb128(&mut handler_list, *type_idx);
                write_uleb128(&mut handler_list, *address);
            }
            if let Some(address) = catch_all {
                write_uleb128(&mut handler_list, *address);
            }
        }
    }

    let tries_size = u16::try_from(code.tries.len())
        .map_err(|_| site.malformed("more than 65535 try blocks"))?;
    out.u16(code.registers);
    out.u16(code.ins);
    out.u16(code.outs);
    out.u16(tries_size);
    out.u32(debug_info_off);
    out.u32(assembled.insns.len() as u32);
    for unit in &assembled.insns {
        out.u16(*unit);
    }
    if tries_size > 0 && assembled.insns.len() % 2 == 1 {
        out.u16(0);
    }
    for (block, slot) in code.tries.iter().zip(&try_handlers) {
        let start = addresses[block.start as usize];
        let count = u16::try_from(addresses[block.end as usize] - start)
            .map_err(|_| site.malformed("try block covers more than 65535 code units"))?;
        let handler_off = u16::try_from(handler_offsets[*slot])
            .map_err(|_| site.malformed("catch handler list is too large"))?;
        out.u32(start);
        out.u16(count);
        out.u16(handler_off);
    }
    out.bytes(&handler_list);
    Ok(())
}
