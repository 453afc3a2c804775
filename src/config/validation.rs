use super::ServerSpec;
use crate::error::{Error, Result};
use crate::render::{check_template, Placeholder, Template};
use std::collections::HashSet;

/// Fail if two entries share a name. Names key records, locks and log files,
/// so the whole load is rejected rather than picking one.
pub fn check_unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateServer(name.to_string()));
        }
    }
    Ok(())
}

/// Non-fatal findings for a single, otherwise valid entry.
pub fn entry_warnings(spec: &ServerSpec) -> Vec<String> {
    let mut warnings: Vec<String> = check_template(spec)
        .into_iter()
        .map(|w| format!("server '{}': {}", spec.name, w))
        .collect();

    if let Some(template) = &spec.launch_template {
        if spec.raw_command.is_some() && !template_references_command(template) {
            warnings.push(format!(
                "server '{}': 'start_command' is set but the template never uses {{start_command}}",
                spec.name
            ));
        }
    }

    if let Some(dir) = &spec.working_directory {
        if !dir.is_dir() {
            warnings.push(format!(
                "server '{}': working directory '{}' does not exist",
                spec.name,
                dir.display()
            ));
        }
    }
    warnings
}

fn template_references_command(template: &str) -> bool {
    Template::parse(template)
        .placeholders()
        .any(|(_, p)| p == Placeholder::StartCommand)
}
