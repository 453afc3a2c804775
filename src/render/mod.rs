//! Launch command rendering.
//!
//! A server either supplies a `launch_template` that wraps its
//! `raw_command` (typically a stdio-to-SSE gateway invocation), or only a
//! `raw_command` that is run as-is. Rendering is pure: nothing is spawned.

mod quote;
mod template;

pub use quote::{quote_for, QuoteContext};
pub use template::{Placeholder, RenderWarning, Template};

use crate::config::ServerSpec;
use crate::error::{Error, Result};

/// The concrete `/bin/sh -c` command line for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub command: String,
    pub warnings: Vec<RenderWarning>,
}

/// Render the launch command for `spec`.
///
/// Fails only when the entry has neither a template nor a raw command, which
/// the config loader already rejects.
pub fn render_command(spec: &ServerSpec) -> Result<RenderedCommand> {
    match (&spec.launch_template, &spec.raw_command) {
        (Some(template), _) => {
            let (command, warnings) = Template::parse(template).render(spec);
            Ok(RenderedCommand { command, warnings })
        }
        (None, Some(raw)) => Ok(RenderedCommand {
            command: raw.clone(),
            warnings: Vec::new(),
        }),
        (None, None) => Err(Error::Validation(format!(
            "server '{}' has no launch command",
            spec.name
        ))),
    }
}

/// Load-time template check: every problem `render_command` would warn about.
pub fn check_template(spec: &ServerSpec) -> Vec<RenderWarning> {
    match render_command(spec) {
        Ok(rendered) => rendered.warnings,
        Err(_) => Vec::new(),
    }
}
