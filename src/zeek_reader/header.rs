// TSV header directives: #separator, #set_separator, #empty_field, #unset_field, #fields.

#[derive(Debug, Clone)]
pub struct Header {
    pub(super) separator: String,
    pub(super) set_separator: String,
    pub(super) empty_field: String,
    pub(super) unset_field: String,
    pub(super) fields: Vec<String>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            separator: "\t".into(),
            set_separator: ",".into(),
            empty_field: "(empty)".into(),
            unset_field: "-".into(),
            fields: Vec::new(),
        }
    }
}

impl Header {
    /// Apply one `#...` line (without the leading '#'). Unknown directives
    /// (#path, #open, #types, #close) are ignored.
    pub(super) fn apply(&mut self, directive: &str) {
        // #separator is always space-delimited since it defines the delimiter.
        if let Some(rest) = directive.strip_prefix("separator ") {
            self.separator = unescape(rest.trim());
            return;
        }
        let mut parts = directive.split(self.separator.as_str());
        let Some(name) = parts.next() else {
            return;
        };
        match name {
            "set_separator" => {
                if let Some(v) = parts.next() {
                    self.set_separator = unescape(v);
                }
            }
            "empty_field" => {
                if let Some(v) = parts.next() {
                    self.empty_field = unescape(v);
                }
            }
            "unset_field" => {
                if let Some(v) = parts.next() {
                    self.unset_field = unescape(v);
                }
            }
            "fields" => {
                self.fields = parts.map(str::to_owned).collect();
            }
            _ => {}
        }
    }

    pub(super) fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// Decode `\xHH` escapes as used in Zeek header values. Only ASCII escapes are decoded;
/// a non-ASCII byte has no single-byte `char`, so it is left as written.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("\\x") {
        out.push_str(&rest[..pos]);
        let byte = rest
            .get(pos + 2..pos + 4)
            .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .filter(u8::is_ascii);
        match byte {
            Some(b) => {
                out.push(char::from(b));
                rest = &rest[pos + 4..];
            }
            None => {
                out.push_str("\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}
