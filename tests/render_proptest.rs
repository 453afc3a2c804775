/// Property-based tests for launch command rendering
///
/// Substituted values must reach the server as exactly the configured text,
/// whatever quoting the template puts around the placeholder. These tests
/// hand the rendered command to a real `/bin/sh` and compare what it prints.
use mcp_manager::config::ServerSpec;
use mcp_manager::render_command;
use proptest::prelude::*;

/// Printable ASCII, which covers every shell metacharacter.
fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,24}").expect("Valid regex")
}

fn spec_with_origin(template: &str, origin: &str) -> ServerSpec {
    let mut spec = ServerSpec::new("prop", "true").with_template(template);
    spec.allow_origin = origin.to_string();
    spec
}

#[cfg(unix)]
fn shell_output(command: &str) -> String {
    let output = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .output()
        .expect("Failed to run /bin/sh");
    assert!(
        output.status.success(),
        "shell rejected {:?}: {}",
        command,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[cfg(unix)]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bare_placeholder_is_one_literal_word(value in value_strategy()) {
        let rendered = render_command(&spec_with_origin("printf '[%s]' {allow_origin}", &value)).unwrap();
        prop_assert_eq!(shell_output(&rendered.command), format!("[{}]", value));
    }

    #[test]
    fn single_quoted_placeholder_is_literal(value in value_strategy()) {
        let rendered = render_command(&spec_with_origin("printf '[%s]' '{allow_origin}'", &value)).unwrap();
        prop_assert_eq!(shell_output(&rendered.command), format!("[{}]", value));
    }

    #[test]
    fn double_quoted_placeholder_is_literal(value in value_strategy()) {
        let rendered = render_command(&spec_with_origin("printf '[%s]' \"{allow_origin}\"", &value)).unwrap();
        prop_assert_eq!(shell_output(&rendered.command), format!("[{}]", value));
    }

    #[test]
    fn placeholder_inside_larger_word(value in value_strategy()) {
        let rendered = render_command(&spec_with_origin("printf '[%s]' --origin={allow_origin}", &value)).unwrap();
        prop_assert_eq!(shell_output(&rendered.command), format!("[--origin={}]", value));
    }
}

proptest! {
    #[test]
    fn templates_without_placeholders_are_unchanged(text in "[^{}]{0,64}") {
        let rendered = render_command(&spec_with_origin(&text, "*")).unwrap();
        prop_assert_eq!(rendered.command, text);
        prop_assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn rendering_never_panics(template in ".{0,64}", origin in ".{0,16}") {
        let _ = render_command(&spec_with_origin(&template, &origin));
    }
}
