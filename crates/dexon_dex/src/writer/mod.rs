//! Dex image serialization.
//!
//! The image is built in three parts: the data section is written first,
//! since every id item and class definition points into it, then the id
//! sections, then the header. The parts are concatenated and the header
//! signature and checksum are filled in last.
//!
//! Data items are grouped by kind in a fixed order, each group contiguous:
//! string data, type lists, debug info, code, encoded arrays, annotations,
//! annotation sets, annotation set ref lists, annotation directories, class
//! data and finally the map list.

mod checksum;
pub(crate) mod code;
mod output;
mod values;

use crate::error::{DexError, DexResult};
use crate::pool::SortedPool;
use crate::DexOptions;
use code::{AssembledCode, Site};
use dexon_common::InternalError;
use dexon_ir::{
    Annotation, Code, CompiledType, EncodedValue, FieldDef, MethodDef, MethodHandleTarget,
};
use indexmap::IndexMap;
use output::{write_mutf8, write_uleb128, ByteOutput};
use std::collections::HashMap;

const HEADER_SIZE: u32 = 0x70;
const ENDIAN_CONSTANT: u32 = 0x1234_5678;
const NO_INDEX: u32 = 0xffff_ffff;

const TYPE_HEADER_ITEM: u16 = 0x0000;
const TYPE_STRING_ID_ITEM: u16 = 0x0001;
const TYPE_TYPE_ID_ITEM: u16 = 0x0002;
const TYPE_PROTO_ID_ITEM: u16 = 0x0003;
const TYPE_FIELD_ID_ITEM: u16 = 0x0004;
const TYPE_METHOD_ID_ITEM: u16 = 0x0005;
const TYPE_CLASS_DEF_ITEM: u16 = 0x0006;
const TYPE_CALL_SITE_ID_ITEM: u16 = 0x0007;
const TYPE_METHOD_HANDLE_ITEM: u16 = 0x0008;
const TYPE_MAP_LIST: u16 = 0x1000;
const TYPE_TYPE_LIST: u16 = 0x1001;
const TYPE_ANNOTATION_SET_REF_LIST: u16 = 0x1002;
const TYPE_ANNOTATION_SET_ITEM: u16 = 0x1003;
const TYPE_CLASS_DATA_ITEM: u16 = 0x2000;
const TYPE_CODE_ITEM: u16 = 0x2001;
const TYPE_STRING_DATA_ITEM: u16 = 0x2002;
const TYPE_DEBUG_INFO_ITEM: u16 = 0x2003;
const TYPE_ANNOTATION_ITEM: u16 = 0x2004;
const TYPE_ENCODED_ARRAY_ITEM: u16 = 0x2005;
const TYPE_ANNOTATIONS_DIRECTORY_ITEM: u16 = 0x2006;

/// Returns the three-digit format version for an image.
pub(crate) fn dex_version(min_api: u32, uses_invoke_custom: bool) -> &'static [u8; 3] {
    if uses_invoke_custom || min_api >= 26 {
        b"038"
    } else if min_api >= 24 {
        b"037"
    } else {
        b"035"
    }
}

fn internal(message: String) -> DexError {
    DexError::Internal(InternalError::new(message))
}

fn narrow(index: u32, what: &str) -> DexResult<u16> {
    u16::try_from(index).map_err(|_| internal(format!("{what} index {index} exceeds 16 bits")))
}

/// Orders class definitions so that supertypes defined in the same image come
/// before their subtypes; otherwise by type index.
fn class_def_order<'a>(
    classes: &'a [std::sync::Arc<CompiledType>],
    pool: &SortedPool,
) -> DexResult<Vec<&'a CompiledType>> {
    let mut by_index = classes
        .iter()
        .map(|c| -> DexResult<(u32, &'a CompiledType)> {
            Ok((pool.type_(&c.descriptor)?, c.as_ref()))
        })
        .collect::<DexResult<Vec<_>>>()?;
    by_index.sort_by_key(|(index, _)| *index);

    let position: HashMap<&str, usize> = by_index
        .iter()
        .enumerate()
        .map(|(i, (_, c))| (c.descriptor.as_str(), i))
        .collect();

    let mut visited = vec![false; by_index.len()];
    let mut order = Vec::with_capacity(by_index.len());
    let mut stack = Vec::new();
    for root in 0..by_index.len() {
        stack.push((root, false));
        while let Some((i, expanded)) = stack.pop() {
            if expanded {
                order.push(by_index[i].1);
                continue;
            }
            if visited[i] {
                continue;
            }
            visited[i] = true;
            stack.push((i, true));
            let supers: Vec<&str> = by_index[i].1.supertypes().collect();
            for supertype in supers.into_iter().rev() {
                if let Some(&j) = position.get(supertype) {
                    if !visited[j] {
                        stack.push((j, false));
                    }
                }
            }
        }
    }
    Ok(order)
}

struct MapItem {
    type_code: u16,
    size: u32,
    offset: u32,
}

/// Where the id sections land, computed from the table sizes alone.
struct IdLayout {
    string_ids: u32,
    type_ids: u32,
    proto_ids: u32,
    field_ids: u32,
    method_ids: u32,
    class_defs: u32,
    call_site_ids: u32,
    method_handles: u32,
    data: u32,
}

impl IdLayout {
    fn new(pool: &SortedPool, classes: usize) -> Self {
        let string_ids = HEADER_SIZE;
        let type_ids = string_ids + 4 * pool.strings.len() as u32;
        let proto_ids = type_ids + 4 * pool.types.len() as u32;
        let field_ids = proto_ids + 12 * pool.protos.len() as u32;
        let method_ids = field_ids + 8 * pool.fields.len() as u32;
        let class_defs = method_ids + 8 * pool.methods.len() as u32;
        let call_site_ids = class_defs + 32 * classes as u32;
        let method_handles = call_site_ids + 4 * pool.call_sites.len() as u32;
        let data = method_handles + 8 * pool.method_handles.len() as u32;
        Self {
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
            call_site_ids,
            method_handles,
            data,
        }
    }
}

/// An assembled method body awaiting its `code_item`.
struct Body<'a> {
    index: u32,
    owner: &'a str,
    label: String,
    code: &'a Code,
    assembled: AssembledCode,
}

/// Per-class offsets into the data section.
#[derive(Default, Clone, Copy)]
struct ClassOffsets {
    interfaces: u32,
    annotations: u32,
    class_data: u32,
    static_values: u32,
}

/// The annotation lists of one class, keyed by member index.
struct AnnotationPlan<'a> {
    class: &'a [Annotation],
    fields: Vec<(u32, &'a [Annotation])>,
    methods: Vec<(u32, &'a [Annotation])>,
    parameters: Vec<(u32, &'a [Vec<Annotation>])>,
}

impl AnnotationPlan<'_> {
    fn is_empty(&self) -> bool {
        self.class.is_empty()
            && self.fields.is_empty()
            && self.methods.is_empty()
            && self.parameters.is_empty()
    }
}

struct ImageWriter<'a> {
    pool: &'a SortedPool,
    options: &'a DexOptions,
    classes: Vec<&'a CompiledType>,
    layout: IdLayout,
    data: ByteOutput,
    map: Vec<MapItem>,
    string_offsets: Vec<u32>,
    type_lists: IndexMap<Vec<u16>, u32>,
    call_site_offsets: Vec<u32>,
    code_offsets: HashMap<u32, u32>,
    class_offsets: Vec<ClassOffsets>,
}

/// Serializes a complete dex image.
pub(crate) fn write_image(
    classes: &[std::sync::Arc<CompiledType>],
    pool: &SortedPool,
    options: &DexOptions,
) -> DexResult<Vec<u8>> {
    let ordered = class_def_order(classes, pool)?;
    let layout = IdLayout::new(pool, ordered.len());
    let data = ByteOutput::new(layout.data);
    let class_count = ordered.len();
    let mut writer = ImageWriter {
        pool,
        options,
        classes: ordered,
        layout,
        data,
        map: Vec::new(),
        string_offsets: Vec::new(),
        type_lists: IndexMap::new(),
        call_site_offsets: Vec::new(),
        code_offsets: HashMap::new(),
        class_offsets: vec![ClassOffsets::default(); class_count],
    };
    writer.string_data();
    writer.type_lists()?;
    writer.code()?;
    writer.encoded_arrays()?;
    writer.annotations()?;
    writer.class_data()?;
    writer.finish()
}

impl<'a> ImageWriter<'a> {
    fn record(&mut self, type_code: u16, size: usize, offset: u32) {
        if size > 0 {
            self.map.push(MapItem {
                type_code,
                size: size as u32,
                offset,
            });
        }
    }

    fn string_data(&mut self) {
        let pool = self.pool;
        let start = self.data.position();
        let mut scratch = Vec::new();
        for s in &pool.strings {
            self.string_offsets.push(self.data.position());
            self.data.uleb128(s.encode_utf16().count() as u32);
            scratch.clear();
            write_mutf8(&mut scratch, s);
            self.data.bytes(&scratch);
            self.data.u8(0);
        }
        self.record(TYPE_STRING_DATA_ITEM, pool.strings.len(), start);
    }

    fn type_list_key(&self, types: &[String]) -> DexResult<Vec<u16>> {
        types
            .iter()
            .map(|t| narrow(self.pool.type_(t)?, "type"))
            .collect()
    }

    fn type_lists(&mut self) -> DexResult<()> {
        let mut keys = Vec::new();
        for proto in &self.pool.protos {
            if !proto.parameters.is_empty() {
                keys.push(self.type_list_key(&proto.parameters)?);
            }
        }
        for class in &self.classes {
            if !class.interfaces.is_empty() {
                keys.push(self.type_list_key(&class.interfaces)?);
            }
        }

        self.data.align(4);
        let start = self.data.position();
        for key in keys {
            if self.type_lists.contains_key(&key) {
                continue;
            }
            self.data.align(4);
            let offset = self.data.position();
            self.data.u32(key.len() as u32);
            for index in &key {
                self.data.u16(*index);
            }
            self.type_lists.insert(key, offset);
        }
        self.record(TYPE_TYPE_LIST, self.type_lists.len(), start);
        Ok(())
    }

    fn type_list_offset(&self, types: &[String]) -> DexResult<u32> {
        if types.is_empty() {
            return Ok(0);
        }
        let key = self.type_list_key(types)?;
        self.type_lists
            .get(&key)
            .copied()
            .ok_or_else(|| internal(format!("type list {types:?} was not written")))
    }

    fn code(&mut self) -> DexResult<()> {
        let pool = self.pool;
        let mut bodies: Vec<Body<'a>> = Vec::new();
        for class in self.classes.iter().copied() {
            let mut methods = class
                .methods
                .iter()
                .filter_map(|m| m.code.as_ref().map(|code| (m, code)))
                .map(|(m, code)| -> DexResult<(u32, &'a MethodDef, &'a Code)> {
                    Ok((pool.method(&class.method_ref(m))?, m, code))
                })
                .collect::<DexResult<Vec<_>>>()?;
            methods.sort_by_key(|(index, _, _)| *index);
            for (index, method, code) in methods {
                let label = format!("{}{}", method.name, method.proto);
                let site = Site {
                    owner: &class.descriptor,
                    method: &label,
                };
                let assembled = code::assemble(code, pool, self.options.force_jumbo, &site)?;
                bodies.push(Body {
                    index,
                    owner: &class.descriptor,
                    label,
                    code,
                    assembled,
                });
            }
        }

        let start = self.data.position();
        let mut debug_offsets = HashMap::new();
        for body in &bodies {
            let Body {
                index,
                code,
                assembled,
                ..
            } = body;
            if let Some(debug) = &code.debug_info {
                debug_offsets.insert(*index, self.data.position());
                let bytes = code::write_debug_info(debug, &assembled.addresses, pool)?;
                self.data.bytes(&bytes);
            }
        }
        self.record(TYPE_DEBUG_INFO_ITEM, debug_offsets.len(), start);

        self.data.align(4);
        let start = self.data.position();
        for body in &bodies {
            self.data.align(4);
            self.code_offsets.insert(body.index, self.data.position());
            let site = Site {
                owner: body.owner,
                method: &body.label,
            };
            let debug_off = debug_offsets.get(&body.index).copied().unwrap_or(0);
            code::write_code_item(
                &mut self.data,
                body.code,
                &body.assembled,
                debug_off,
                pool,
                &site,
            )?;
        }
        self.record(TYPE_CODE_ITEM, bodies.len(), start);
        Ok(())
    }

    fn sorted_fields(&self, class: &'a CompiledType, statics: bool) -> DexResult<Vec<(u32, &'a FieldDef)>> {
        let mut fields = class
            .fields
            .iter()
            .filter(|f| f.is_static() == statics)
            .map(|f| -> DexResult<(u32, &'a FieldDef)> {
                Ok((self.pool.field(&class.field_ref(f))?, f))
            })
            .collect::<DexResult<Vec<_>>>()?;
        fields.sort_by_key(|(index, _)| *index);
        Ok(fields)
    }

    fn sorted_methods(&self, class: &'a CompiledType, direct: bool) -> DexResult<Vec<(u32, &'a MethodDef)>> {
        let mut methods = class
            .methods
            .iter()
            .filter(|m| m.is_direct() == direct)
            .map(|m| -> DexResult<(u32, &'a MethodDef)> {
                Ok((self.pool.method(&class.method_ref(m))?, m))
            })
            .collect::<DexResult<Vec<_>>>()?;
        methods.sort_by_key(|(index, _)| *index);
        Ok(methods)
    }

    fn encoded_arrays(&mut self) -> DexResult<()> {
        let pool = self.pool;
        let start = self.data.position();
        let mut scratch = Vec::new();
        for site in &pool.call_sites {
            self.call_site_offsets.push(self.data.position());
            let mut items = vec![
                EncodedValue::MethodHandle(site.bootstrap.clone()),
                EncodedValue::String(site.method_name.clone()),
                EncodedValue::MethodType(site.method_type.clone()),
            ];
            items.extend(site.extra_args.iter().cloned());
            scratch.clear();
            values::write_array(&mut scratch, &items, pool)?;
            self.data.bytes(&scratch);
        }

        let mut static_arrays: IndexMap<Vec<u8>, u32> = IndexMap::new();
        for position in 0..self.classes.len() {
            let class = self.classes[position];
            let statics = self.sorted_fields(class, true)?;
            let Some(last) = statics.iter().rposition(|(_, f)| f.initial_value.is_some()) else {
                continue;
            };
            let items: Vec<EncodedValue> = statics[..=last]
                .iter()
                .map(|(_, f)| {
                    f.initial_value
                        .clone()
                        .unwrap_or_else(|| EncodedValue::default_for(&f.type_))
                })
                .collect();
            scratch.clear();
            values::write_array(&mut scratch, &items, pool)?;
            let offset = match static_arrays.get(&scratch) {
                Some(&offset) => offset,
                None => {
                    let offset = self.data.position();
                    self.data.bytes(&scratch);
                    static_arrays.insert(scratch.clone(), offset);
                    offset
                }
            };
            self.class_offsets[position].static_values = offset;
        }
        self.record(
            TYPE_ENCODED_ARRAY_ITEM,
            pool.call_sites.len() + static_arrays.len(),
            start,
        );
        Ok(())
    }

    fn annotation_plan(&self, class: &'a CompiledType) -> DexResult<AnnotationPlan<'a>> {
        let mut fields = class
            .fields
            .iter()
            .filter(|f| !f.annotations.is_empty())
            .map(|f| -> DexResult<(u32, &'a [Annotation])> {
                Ok((self.pool.field(&class.field_ref(f))?, f.annotations.as_slice()))
            })
            .collect::<DexResult<Vec<_>>>()?;
        fields.sort_by_key(|(index, _)| *index);

        let mut methods = Vec::new();
        let mut parameters = Vec::new();
        for method in &class.methods {
            let index = self.pool.method(&class.method_ref(method))?;
            if !method.annotations.is_empty() {
                methods.push((index, method.annotations.as_slice()));
            }
            if method.parameter_annotations.iter().any(|p| !p.is_empty()) {
                parameters.push((index, method.parameter_annotations.as_slice()));
            }
        }
        methods.sort_by_key(|(index, _)| *index);
        parameters.sort_by_key(|(index, _)| *index);
        Ok(AnnotationPlan {
            class: &class.annotations,
            fields,
            methods,
            parameters,
        })
    }

    fn annotation_bytes(&self, annotation: &Annotation) -> DexResult<(u32, Vec<u8>)> {
        let mut bytes = vec![annotation.visibility.code()];
        values::write_annotation(&mut bytes, &annotation.annotation, self.pool)?;
        Ok((self.pool.type_(annotation.type_())?, bytes))
    }

    /// Offsets of a set's annotation items, in type index order.
    fn set_entries(
        &self,
        list: &[Annotation],
        items: &HashMap<Vec<u8>, u32>,
    ) -> DexResult<Vec<u32>> {
        let mut entries = list
            .iter()
            .map(|a| self.annotation_bytes(a))
            .collect::<DexResult<Vec<_>>>()?;
        entries.sort_by_key(|(type_index, _)| *type_index);
        entries
            .into_iter()
            .map(|(_, bytes)| {
                items
                    .get(&bytes)
                    .copied()
                    .ok_or_else(|| internal("annotation item was not written".to_string()))
            })
            .collect()
    }

    fn annotations(&mut self) -> DexResult<()> {
        let plans = self
            .classes
            .iter()
            .copied()
            .map(|c| self.annotation_plan(c))
            .collect::<DexResult<Vec<_>>>()?;

        let mut lists: Vec<&[Annotation]> = Vec::new();
        for plan in &plans {
            lists.push(plan.class);
            lists.extend(plan.fields.iter().map(|(_, l)| *l));
            lists.extend(plan.methods.iter().map(|(_, l)| *l));
            for (_, params) in &plan.parameters {
                lists.extend(params.iter().map(Vec::as_slice));
            }
        }
        lists.retain(|l| !l.is_empty());

        // annotation_item
        let start = self.data.position();
        let mut items: HashMap<Vec<u8>, u32> = HashMap::new();
        for list in &lists {
            for annotation in *list {
                let (_, bytes) = self.annotation_bytes(annotation)?;
                if !items.contains_key(&bytes) {
                    items.insert(bytes.clone(), self.data.position());
                    self.data.bytes(&bytes);
                }
            }
        }
        self.record(TYPE_ANNOTATION_ITEM, items.len(), start);

        // annotation_set_item
        self.data.align(4);
        let start = self.data.position();
        let mut sets: IndexMap<Vec<u32>, u32> = IndexMap::new();
        for list in &lists {
            let entries = self.set_entries(list, &items)?;
            if sets.contains_key(&entries) {
                continue;
            }
            self.data.align(4);
            let offset = self.data.position();
            self.data.u32(entries.len() as u32);
            for entry in &entries {
                self.data.u32(*entry);
            }
            sets.insert(entries, offset);
        }
        self.record(TYPE_ANNOTATION_SET_ITEM, sets.len(), start);

        let set_offset = |this: &Self, list: &[Annotation]| -> DexResult<u32> {
            if list.is_empty() {
                return Ok(0);
            }
            let entries = this.set_entries(list, &items)?;
            sets.get(&entries)
                .copied()
                .ok_or_else(|| internal("annotation set was not written".to_string()))
        };

        // annotation_set_ref_list
        self.data.align(4);
        let start = self.data.position();
        let mut ref_lists: Vec<HashMap<u32, u32>> = Vec::with_capacity(plans.len());
        let mut ref_list_count = 0;
        for plan in &plans {
            let mut offsets = HashMap::new();
            for (method, params) in &plan.parameters {
                let entries = params
                    .iter()
                    .map(|p| set_offset(self, p))
                    .collect::<DexResult<Vec<_>>>()?;
                self.data.align(4);
                offsets.insert(*method, self.data.position());
                self.data.u32(entries.len() as u32);
                for entry in entries {
                    self.data.u32(entry);
                }
                ref_list_count += 1;
            }
            ref_lists.push(offsets);
        }
        self.record(TYPE_ANNOTATION_SET_REF_LIST, ref_list_count, start);

        // annotations_directory_item
        self.data.align(4);
        let start = self.data.position();
        let mut directories = 0;
        for (position, plan) in plans.iter().enumerate() {
            if plan.is_empty() {
                continue;
            }
            let class_set = set_offset(self, plan.class)?;
            let fields = plan
                .fields
                .iter()
                .map(|(index, list)| -> DexResult<(u32, u32)> {
                    Ok((*index, set_offset(self, list)?))
                })
                .collect::<DexResult<Vec<_>>>()?;
            let methods = plan
                .methods
                .iter()
                .map(|(index, list)| -> DexResult<(u32, u32)> {
                    Ok((*index, set_offset(self, list)?))
                })
                .collect::<DexResult<Vec<_>>>()?;

            self.data.align(4);
            self.class_offsets[position].annotations = self.data.position();
            self.data.u32(class_set);
            self.data.u32(fields.len() as u32);
            self.data.u32(methods.len() as u32);
            self.data.u32(plan.parameters.len() as u32);
            for (index, offset) in fields.into_iter().chain(methods) {
                self.data.u32(index);
                self.data.u32(offset);
            }
            for (method, _) in &plan.parameters {
                let offset = ref_lists[position].get(method).copied().unwrap_or(0);
                self.data.u32(*method);
                self.data.u32(offset);
            }
            directories += 1;
        }
        self.record(TYPE_ANNOTATIONS_DIRECTORY_ITEM, directories, start);
        Ok(())
    }

    fn class_data(&mut self) -> DexResult<()> {
        let start = self.data.position();
        let mut count = 0;
        for position in 0..self.classes.len() {
            let class = self.classes[position];
            if class.fields.is_empty() && class.methods.is_empty() {
                continue;
            }
            let statics = self.sorted_fields(class, true)?;
            let instance = self.sorted_fields(class, false)?;
            let direct = self.sorted_methods(class, true)?;
            let virtuals = self.sorted_methods(class, false)?;

            self.class_offsets[position].class_data = self.data.position();
            self.data.uleb128(statics.len() as u32);
            self.data.uleb128(instance.len() as u32);
            self.data.uleb128(direct.len() as u32);
            self.data.uleb128(virtuals.len() as u32);
            for fields in [&statics, &instance] {
                let mut previous = 0;
                for (index, field) in fields {
                    self.data.uleb128(index - previous);
                    self.data.uleb128(field.access_flags);
                    previous = *index;
                }
            }
            for methods in [&direct, &virtuals] {
                let mut previous = 0;
                for (index, method) in methods {
                    self.data.uleb128(index - previous);
                    self.data.uleb128(method.access_flags);
                    let code_off = match method.code {
                        Some(_) => self.code_offsets.get(index).copied().ok_or_else(|| {
                            internal(format!("code for method index {index} was not written"))
                        })?,
                        None => 0,
                    };
                    self.data.uleb128(code_off);
                    previous = *index;
                }
            }
            count += 1;
        }
        self.record(TYPE_CLASS_DATA_ITEM, count, start);

        for position in 0..self.classes.len() {
            let interfaces = self.type_list_offset(&self.classes[position].interfaces)?;
            self.class_offsets[position].interfaces = interfaces;
        }
        Ok(())
    }

    fn id_sections(&self) -> DexResult<Vec<u8>> {
        let pool = self.pool;
        let mut ids = ByteOutput::new(HEADER_SIZE);
        for offset in &self.string_offsets {
            ids.u32(*offset);
        }
        for t in &pool.types {
            ids.u32(pool.string(t)?);
        }
        for proto in &pool.protos {
            ids.u32(pool.string(&proto.shorty())?);
            ids.u32(pool.type_(&proto.return_type)?);
            ids.u32(self.type_list_offset(&proto.parameters)?);
        }
        for field in &pool.fields {
            ids.u16(narrow(pool.type_(&field.class)?, "type")?);
            ids.u16(narrow(pool.type_(&field.type_)?, "type")?);
            ids.u32(pool.string(&field.name)?);
        }
        for method in &pool.methods {
            ids.u16(narrow(pool.type_(&method.class)?, "type")?);
            ids.u16(narrow(pool.proto(&method.proto)?, "proto")?);
            ids.u32(pool.string(&method.name)?);
        }
        for (class, offsets) in self.classes.iter().zip(&self.class_offsets) {
            ids.u32(pool.type_(&class.descriptor)?);
            ids.u32(class.access_flags);
            ids.u32(match &class.superclass {
                Some(superclass) => pool.type_(superclass)?,
                None => NO_INDEX,
            });
            ids.u32(offsets.interfaces);
            ids.u32(match &class.source_file {
                Some(source) => pool.string(source)?,
                None => NO_INDEX,
            });
            ids.u32(offsets.annotations);
            ids.u32(offsets.class_data);
            ids.u32(offsets.static_values);
        }
        for offset in &self.call_site_offsets {
            ids.u32(*offset);
        }
        for handle in &pool.method_handles {
            let member = match &handle.target {
                MethodHandleTarget::Field(f) => narrow(pool.field(f)?, "field")?,
                MethodHandleTarget::Method(m) => narrow(pool.method(m)?, "method")?,
            };
            ids.u16(handle.kind.code());
            ids.u16(0);
            ids.u16(member);
            ids.u16(0);
        }
        if ids.position() != self.layout.data {
            return Err(internal(format!(
                "id sections end at {:#x}, data was laid out at {:#x}",
                ids.position(),
                self.layout.data
            )));
        }
        Ok(ids.into_bytes())
    }

    fn finish(mut self) -> DexResult<Vec<u8>> {
        let pool = self.pool;
        let layout = &self.layout;
        let mut map = vec![MapItem {
            type_code: TYPE_HEADER_ITEM,
            size: 1,
            offset: 0,
        }];
        let id_items = [
            (TYPE_STRING_ID_ITEM, pool.strings.len(), layout.string_ids),
            (TYPE_TYPE_ID_ITEM, pool.types.len(), layout.type_ids),
            (TYPE_PROTO_ID_ITEM, pool.protos.len(), layout.proto_ids),
            (TYPE_FIELD_ID_ITEM, pool.fields.len(), layout.field_ids),
            (TYPE_METHOD_ID_ITEM, pool.methods.len(), layout.method_ids),
            (TYPE_CLASS_DEF_ITEM, self.classes.len(), layout.class_defs),
            (TYPE_CALL_SITE_ID_ITEM, pool.call_sites.len(), layout.call_site_ids),
            (TYPE_METHOD_HANDLE_ITEM, pool.method_handles.len(), layout.method_handles),
        ];
        for (type_code, size, offset) in id_items {
            if size > 0 {
                map.push(MapItem {
                    type_code,
                    size: size as u32,
                    offset,
                });
            }
        }
        map.append(&mut self.map);

        self.data.align(4);
        let map_off = self.data.position();
        map.push(MapItem {
            type_code: TYPE_MAP_LIST,
            size: 1,
            offset: map_off,
        });
        self.data.u32(map.len() as u32);
        for item in &map {
            self.data.u16(item.type_code);
            self.data.u16(0);
            self.data.u32(item.size);
            self.data.u32(item.offset);
        }

        let ids = self.id_sections()?;
        let data_off = self.layout.data;
        let data_size = self.data.len() as u32;
        let file_size = data_off + data_size;

        let mut header = ByteOutput::new(0);
        let version = dex_version(
            self.options.min_api,
            !pool.call_sites.is_empty() || !pool.method_handles.is_empty(),
        );
        header.bytes(b"dex\n");
        header.bytes(version);
        header.u8(0);
        header.u32(0);
        header.bytes(&[0; 20]);
        header.u32(file_size);
        header.u32(HEADER_SIZE);
        header.u32(ENDIAN_CONSTANT);
        header.u32(0);
        header.u32(0);
        header.u32(map_off);
        let sections = [
            (pool.strings.len(), layout.string_ids),
            (pool.types.len(), layout.type_ids),
            (pool.protos.len(), layout.proto_ids),
            (pool.fields.len(), layout.field_ids),
            (pool.methods.len(), layout.method_ids),
            (self.classes.len(), layout.class_defs),
        ];
        for (size, offset) in sections {
            header.u32(size as u32);
            header.u32(if size == 0 { 0 } else { offset });
        }
        header.u32(data_size);
        header.u32(data_off);

        let mut image = header.into_bytes();
        image.extend_from_slice(&ids);
        image.extend_from_slice(&self.data.into_bytes());
        checksum::seal_header(&mut image);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConstantPool;
    use std::sync::Arc;

    #[test]
    fn version_selection() {
        assert_eq!(dex_version(21, false), b"035");
        assert_eq!(dex_version(24, false), b"037");
        assert_eq!(dex_version(25, false), b"037");
        assert_eq!(dex_version(26, false), b"038");
        assert_eq!(dex_version(21, true), b"038");
    }

    #[test]
    fn supertypes_precede_subtypes() {
        let classes: Vec<Arc<CompiledType>> = vec![
            Arc::new(CompiledType::new("LA;").with_superclass("LC;")),
            Arc::new(CompiledType::new("LB;")),
            Arc::new(CompiledType::new("LC;").with_interface("LZ;")),
            Arc::new(CompiledType::new("LZ;")),
        ];
        let mut pool = ConstantPool::new();
        for class in &classes {
            pool.add_type(&class.descriptor);
            for supertype in class.supertypes() {
                pool.add_type(supertype);
            }
        }
        let pool = pool.into_sorted();
        let order: Vec<&str> = class_def_order(&classes, &pool)
            .unwrap()
            .iter()
            .map(|c| c.descriptor.as_str())
            .collect();
        assert_eq!(order, vec!["LZ;", "LC;", "LA;", "LB;"]);
    }
}
