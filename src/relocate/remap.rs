//! Name remapping shared by class files, entry paths and text resources
//!
//! Works on raw bytes so modified UTF-8 from class files is handled the same
//! as plain UTF-8. A prefix only matches where a name starts (not in the
//! middle of an identifier) and only when followed by a separator or the
//! end of the name, so `org.foo` never matches `org.foobar`.

use crate::model::RelocationRuleSet;

struct Form {
    from: Vec<u8>,
    to: Vec<u8>,
    excludes: Vec<Vec<u8>>,
}

/// Compiled relocation rules, in both `a/b/C` and `a.b.C` spelling
pub struct Remapper {
    forms: Vec<Form>,
}

impl Remapper {
    pub fn new(rules: &RelocationRuleSet) -> Self {
        let mut forms = Vec::new();
        for rule in rules.rules() {
            for separator in [b'/', b'.'] {
                let spell = |s: &str| -> Vec<u8> {
                    s.bytes()
                        .map(|b| if b == b'.' { separator } else { b })
                        .collect()
                };
                forms.push(Form {
                    from: spell(&rule.from),
                    to: spell(&rule.to),
                    excludes: rule.excludes.iter().map(|e| spell(e)).collect(),
                });
            }
        }
        Self { forms }
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Rewrite every matching name in `input`; `None` when nothing matched
    pub fn map_bytes(&self, input: &[u8]) -> Option<Vec<u8>> {
        let mut output: Option<Vec<u8>> = None;
        let mut copied = 0;
        let mut i = 0;

        while i < input.len() {
            if starts_name(input, i) {
                if let Some(form) = self.match_at(input, i) {
                    let out = output.get_or_insert_with(|| Vec::with_capacity(input.len() + 32));
                    out.extend_from_slice(&input[copied..i]);
                    out.extend_from_slice(&form.to);
                    i += form.from.len();
                    copied = i;
                    continue;
                }
            }
            i += 1;
        }

        output.map(|mut out| {
            out.extend_from_slice(&input[copied..]);
            out
        })
    }

    /// String variant of [`Remapper::map_bytes`]
    pub fn map_str(&self, input: &str) -> Option<String> {
        self.map_bytes(input.as_bytes())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Rewrite a jar entry path.
    ///
    /// Class and resource paths are slash-separated names; service
    /// descriptors are named after a dotted interface name; multi-release
    /// entries carry a `META-INF/versions/N/` prefix.
    pub fn map_path(&self, path: &str) -> Option<String> {
        const SERVICES: &str = "META-INF/services/";
        const VERSIONS: &str = "META-INF/versions/";

        if let Some(service) = path.strip_prefix(SERVICES) {
            return self
                .map_str(service)
                .map(|mapped| format!("{}{}", SERVICES, mapped));
        }
        if let Some(rest) = path.strip_prefix(VERSIONS) {
            if let Some((version, inner)) = rest.split_once('/') {
                return self
                    .map_str(inner)
                    .map(|mapped| format!("{}{}/{}", VERSIONS, version, mapped));
            }
        }
        self.map_str(path)
    }

    fn match_at(&self, input: &[u8], i: usize) -> Option<&Form> {
        let rest = &input[i..];
        self.forms.iter().find(|form| {
            prefix_matches(rest, &form.from)
                && !form.excludes.iter().any(|e| prefix_matches(rest, e))
        })
    }
}

/// Identifier bytes; anything non-ASCII counts as part of an identifier
fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'-' || b >= 0x80
}

/// Bytes that may precede the `L` of an object type in a descriptor or
/// generic signature
fn is_descriptor_lead(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'[' | b';' | b'<' | b'>' | b'+' | b'-' | b'*' | b':' | b'^')
}

/// Primitive type letters of a descriptor
fn is_primitive(b: u8) -> bool {
    matches!(b, b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z')
}

/// Whether the `L` at `l` opens an object type: it follows a descriptor
/// lead, possibly through a run of primitive parameters (`(IJL...`).
fn opens_object_type(input: &[u8], l: usize) -> bool {
    if l == 0 {
        return true;
    }
    let mut j = l;
    while j > 0 && is_primitive(input[j - 1]) {
        j -= 1;
    }
    j > 0 && is_descriptor_lead(input[j - 1])
}

/// Whether a name may start at `i`
fn starts_name(input: &[u8], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    let prev = input[i - 1];
    if prev == b'L' {
        return opens_object_type(input, i - 1);
    }
    if prev == b'/' {
        // absolute resource path such as `/org/acme/config.properties`
        return i == 1 || !(is_ident(input[i - 2]) || matches!(input[i - 2], b'/' | b'.' | b':'));
    }
    !is_ident(prev) && prev != b'.'
}

/// `rest` starts with `prefix` and the name does not continue the last segment
fn prefix_matches(rest: &[u8], prefix: &[u8]) -> bool {
    rest.starts_with(prefix)
        && rest
            .get(prefix.len())
            .map_or(true, |&next| !is_ident(next))
}
