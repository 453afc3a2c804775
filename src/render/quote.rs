//! Shell quoting for values spliced into a `/bin/sh -c` command line.

use std::borrow::Cow;

/// Where a placeholder sits inside the template, as seen by a POSIX shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteContext {
    Bare,
    Single,
    Double,
}

/// Quote `value` so the shell reads it back as exactly one literal word
/// fragment in the given context.
pub fn quote_for(value: &str, ctx: QuoteContext) -> String {
    match ctx {
        QuoteContext::Bare => shell_escape::unix::escape(Cow::Borrowed(value)).into_owned(),
        // Close the quote, emit an escaped quote, reopen.
        QuoteContext::Single => value.replace('\'', r"'\''"),
        QuoteContext::Double => {
            let mut out = String::with_capacity(value.len());
            for c in value.chars() {
                if matches!(c, '"' | '\\' | '$' | '`') {
                    out.push('\\');
                }
                out.push(c);
            }
            out
        }
    }
}
