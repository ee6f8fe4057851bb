use anyhow::Context;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Render a caller supplied template.
///
/// Field references may be written Go style, `{{ .Host }}`, or plainly, `{{ Host }}`. Referencing
/// a variable that is not provided is an error.
pub fn render<S: Serialize>(name: &str, template: &str, vars: S) -> anyhow::Result<String> {
    environment()
        .render_str(&strip_field_dots(template), vars)
        .with_context(|| format!("Failed to render the {name} template"))
}

/// Check that a template parses, without rendering it.
pub fn check(name: &str, template: &str) -> anyhow::Result<()> {
    let source = strip_field_dots(template);
    let env = environment();
    let parsed = env.template_from_str(&source).map(|_| ());
    parsed.with_context(|| format!("Invalid {name} template"))
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Turn `{{ .Field` into `{{ Field`, keeping any trim marker and whitespace.
fn strip_field_dots(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find("{{") {
        out.push_str(&rest[..pos + 2]);
        rest = &rest[pos + 2..];

        let lead = rest.len()
            - rest
                .trim_start_matches(|c: char| c == '-' || c.is_whitespace())
                .len();
        out.push_str(&rest[..lead]);
        rest = &rest[lead..];

        if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
        }
    }

    out.push_str(rest);
    out
}
