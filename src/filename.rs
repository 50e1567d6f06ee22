//! File-name generation from templates.
//!
//! A template passes through four stages:
//!
//! 1. `$(NAME)` expands to the environment variable `NAME` (empty if unset);
//! 2. a single `%s` is replaced by the run type;
//! 3. up to three integer specifiers (`%d`, `%x`, optionally zero-padded as
//!    in `%06d`) are filled positionally: first the run number, second the
//!    stream id, third the split number — more than three is an error;
//! 4. values not embedded by a specifier are appended: the split number as
//!    `.NNNNNN` when splitting is on, then `.stream<id>` when more than one
//!    stream writes.

use std::env;

use crate::error::{EvioError, Result};

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct SplitContext {
    pub run_number: u32,
    pub split_number: u32,
    pub stream_id: u32,
    pub stream_count: u32,
    pub run_type: String,
}

/// Generates one file name from `template` and the context. `splitting`
/// states whether the writer rolls files, which controls auto-appending of
/// the split number.
pub fn generate_file_name(
    template: &str,
    ctx: &SplitContext,
    splitting: bool,
) -> Result<String> {
    let expanded = expand_env(template);
    let named = expanded.replacen("%s", &ctx.run_type, 1);
    let (substituted, int_specifiers) = substitute_ints(
        &named,
        &[ctx.run_number, ctx.stream_id, ctx.split_number],
    )?;

    let mut name = substituted;
    if splitting && int_specifiers < 3 {
        name.push_str(&format!(".{:06}", ctx.split_number));
    }
    if ctx.stream_count > 1 && int_specifiers < 2 {
        name.push_str(&format!(".stream{}", ctx.stream_id));
    }
    Ok(name)
}

/// Replaces every `$(NAME)` with the environment variable's value.
fn expand_env(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find(')') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Ok(value) = env::var(name) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // Unterminated; keep the text as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Fills integer specifiers positionally from `values`; returns the result
/// and how many specifiers were present.
fn substitute_ints(template: &str, values: &[u32; 3]) -> Result<(String, usize)> {
    let mut out = String::with_capacity(template.len());
    let mut used = 0usize;
    let bytes = template.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        // "%%" is a literal percent.
        if i + 1 < bytes.len() && bytes[i + 1] == b'%' {
            out.push('%');
            i += 2;
            continue;
        }
        // Optional zero flag and width digits, then a conversion letter.
        let mut j = i + 1;
        let zero_pad = j < bytes.len() && bytes[j] == b'0';
        if zero_pad {
            j += 1;
        }
        let width_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let width: usize = template[width_start..j].parse().unwrap_or(0);

        match bytes.get(j) {
            Some(b'd') | Some(b'x') => {
                if used == 3 {
                    return Err(EvioError::BadTemplate(format!(
                        "more than three integer specifiers in {template:?}"
                    )));
                }
                let v = values[used];
                used += 1;
                let hex = bytes[j] == b'x';
                let rendered = match (hex, zero_pad) {
                    (false, true) => format!("{v:0width$}"),
                    (false, false) => format!("{v:width$}"),
                    (true, true) => format!("{v:0width$x}"),
                    (true, false) => format!("{v:width$x}"),
                };
                out.push_str(&rendered);
                i = j + 1;
            }
            _ => {
                // Not an integer specifier; emit verbatim.
                out.push('%');
                i += 1;
            }
        }
    }
    Ok((out, used))
}
