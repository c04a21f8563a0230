use proc_macro2::{Ident, Span};

/// Reserved words that cannot be used as a Rust identifier verbatim. Checked
/// against property and struct names pulled from the archive's name pool,
/// which was never constrained to avoid them (mirrors the closest sibling
/// exporter's `C_KEYWORDS` escape list, adapted for Rust instead of C).
const RUST_KEYWORDS: &[&str] = &[
	"as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod",
	"move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while",
	"async", "await", "dyn", "abstract", "become", "box", "do", "final", "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
];

fn is_rust_keyword(word: &str) -> bool {
	RUST_KEYWORDS.contains(&word)
}

/// Escapes a schema identifier that collides with a Rust keyword by raw-
/// prefixing it, and replaces any character that cannot appear in a Rust
/// identifier with an underscore.
pub(crate) fn sanitize(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	for (i, ch) in name.chars().enumerate() {
		let ok = if i == 0 { ch.is_alphabetic() || ch == '_' } else { ch.is_alphanumeric() || ch == '_' };
		out.push(if ok { ch } else { '_' });
	}
	if out.is_empty() || out.chars().next().unwrap().is_numeric() {
		out.insert(0, '_');
	}
	out
}

/// A struct or field name straight from the schema, turned into a valid Rust
/// identifier in the teacher's naming convention: `PascalCase` for types,
/// `snake_case` for fields, both handled by the caller choosing which of the
/// two helpers below to apply.
pub fn type_ident(name: &str) -> Ident {
	let sanitized = sanitize(name);
	let text = match is_rust_keyword(&sanitized) {
		true => format!("{sanitized}_"),
		false => sanitized,
	};
	Ident::new(&text, Span::call_site())
}

/// Keywords the `r#` raw-identifier escape cannot apply to (the reference
/// explicitly excludes them), so a schema field bearing one of these names
/// falls back to the same trailing-underscore escape `type_ident` uses.
const NOT_RAW_ESCAPABLE: &[&str] = &["crate", "self", "super", "Self"];

pub fn field_ident(name: &str) -> Ident {
	let sanitized = to_snake_case(&sanitize(name));
	if NOT_RAW_ESCAPABLE.contains(&sanitized.as_str()) {
		return Ident::new(&format!("{sanitized}_"), Span::call_site());
	}
	if is_rust_keyword(&sanitized) {
		return Ident::new_raw(&sanitized, Span::call_site());
	}
	Ident::new(&sanitized, Span::call_site())
}

/// Schema property names arrive in whatever casing the original authoring
/// tool used (often `PascalCase` or `camelCase`); generated fields are
/// `snake_case` regardless, so this performs that one conversion by hand
/// rather than pulling in a dedicated case-conversion crate for it.
fn to_snake_case(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 4);
	let mut prev_lower = false;
	for ch in name.chars() {
		if ch.is_uppercase() {
			if prev_lower {
				out.push('_');
			}
			out.extend(ch.to_lowercase());
			prev_lower = false;
		} else {
			out.push(ch);
			prev_lower = ch.is_alphanumeric();
		}
	}
	out
}

