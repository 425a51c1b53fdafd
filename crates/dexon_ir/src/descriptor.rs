//! Type descriptor syntax: validation, shorty characters and register widths.
//!
//! Descriptors follow the dex grammar: `V` (void, return types only), the
//! primitives `ZBSCIJFD`, class types `Lpkg/Name;` and array types `[` +
//! component (at most 255 dimensions).

/// Maximum number of array dimensions in a descriptor.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Returns `true` if `desc` is a valid field or parameter type (anything but `V`).
pub fn is_valid_type(desc: &str) -> bool {
    desc != "V" && is_valid_descriptor(desc)
}

/// Returns `true` if `desc` is a valid return type (any type or `V`).
pub fn is_valid_return_type(desc: &str) -> bool {
    desc == "V" || is_valid_descriptor(desc)
}

/// Returns `true` if `desc` names a class or interface (`Lpkg/Name;`).
pub fn is_class(desc: &str) -> bool {
    match desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
        Some(binary) => is_valid_binary_name(binary),
        None => false,
    }
}

/// Returns `true` if `desc` is an array type.
pub fn is_array(desc: &str) -> bool {
    desc.starts_with('[')
}

fn is_valid_descriptor(desc: &str) -> bool {
    let dims = desc.bytes().take_while(|&b| b == b'[').count();
    if dims > MAX_ARRAY_DIMENSIONS {
        return false;
    }
    let component = &desc[dims..];
    match component {
        "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D" => true,
        "V" => dims == 0,
        _ => is_class(component),
    }
}

fn is_valid_binary_name(binary: &str) -> bool {
    !binary.is_empty() && binary.split('/').all(is_valid_simple_name)
}

/// Returns `true` if `name` is usable as a member or package segment name.
///
/// Rejects empty names and the characters that delimit descriptors.
pub fn is_valid_simple_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| matches!(c, '.' | ';' | '[' | '/') || c.is_whitespace())
}

/// Returns `true` if `name` is a valid method name (`<init>` and `<clinit>` included).
pub fn is_valid_method_name(name: &str) -> bool {
    name == "<init>"
        || name == "<clinit>"
        || (is_valid_simple_name(name) && !name.contains(|c| c == '<' || c == '>'))
}

/// Returns the shorty character of a type: `L` for every reference type.
pub fn shorty_char(desc: &str) -> char {
    match desc.as_bytes().first() {
        Some(b'L') | Some(b'[') => 'L',
        Some(&b) => b as char,
        None => 'V',
    }
}

/// Returns the number of registers a value of this type occupies.
pub fn register_width(desc: &str) -> u16 {
    match desc {
        "V" => 0,
        "J" | "D" => 2,
        _ => 1,
    }
}

/// Returns the element class of an array or class descriptor, if any.
///
/// `[[Lfoo/Bar;` and `Lfoo/Bar;` both yield `Lfoo/Bar;`; primitives yield `None`.
pub fn referenced_class(desc: &str) -> Option<&str> {
    let component = desc.trim_start_matches('[');
    is_class(component).then_some(component)
}

/// Converts a class descriptor to its binary name (`Lfoo/Bar;` to `foo/Bar`).
pub fn binary_name(desc: &str) -> Option<&str> {
    if is_class(desc) {
        desc.strip_prefix('L').and_then(|d| d.strip_suffix(';'))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_and_void() {
        for p in ["Z", "B", "S", "C", "I", "J", "F", "D"] {
            assert!(is_valid_type(p), "{p}");
        }
        assert!(!is_valid_type("V"));
        assert!(is_valid_return_type("V"));
        assert!(!is_valid_type("[V"));
        assert!(!is_valid_type("X"));
    }

    #[test]
    fn class_descriptors() {
        assert!(is_class("Ljava/lang/Object;"));
        assert!(is_class("LFoo;"));
        assert!(!is_class("L;"));
        assert!(!is_class("Ljava.lang.Object;"));
        assert!(!is_class("Ljava//Object;"));
        assert!(!is_class("java/lang/Object"));
    }

    #[test]
    fn array_descriptors() {
        assert!(is_valid_type("[I"));
        assert!(is_valid_type("[[Ljava/lang/String;"));
        assert!(is_array("[I"));
        let too_deep = format!("{}I", "[".repeat(256));
        assert!(!is_valid_type(&too_deep));
    }

    #[test]
    fn shorty_and_width() {
        assert_eq!(shorty_char("[I"), 'L');
        assert_eq!(shorty_char("Lfoo/Bar;"), 'L');
        assert_eq!(shorty_char("J"), 'J');
        assert_eq!(register_width("J"), 2);
        assert_eq!(register_width("D"), 2);
        assert_eq!(register_width("I"), 1);
        assert_eq!(register_width("V"), 0);
    }

    #[test]
    fn referenced_class_strips_arrays() {
        assert_eq!(referenced_class("[[Lfoo/Bar;"), Some("Lfoo/Bar;"));
        assert_eq!(referenced_class("Lfoo/Bar;"), Some("Lfoo/Bar;"));
        assert_eq!(referenced_class("[I"), None);
        assert_eq!(binary_name("Lfoo/Bar;"), Some("foo/Bar"));
        assert_eq!(binary_name("[Lfoo/Bar;"), None);
    }

    #[test]
    fn method_names() {
        assert!(is_valid_method_name("<init>"));
        assert!(is_valid_method_name("run"));
        assert!(!is_valid_method_name("<run>"));
        assert!(!is_valid_method_name(""));
        assert!(!is_valid_method_name("a.b"));
    }
}
