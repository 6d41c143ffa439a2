//! `{{key}}` placeholder rendering.

pub struct TemplateVars;

impl TemplateVars {
    pub const APP: &'static str = "app";
    pub const CURRENT: &'static str = "current";
    pub const LIMIT_NOFILE: &'static str = "limitNofile";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence() {
        let out = render("{{app}} at {{current}}/{{app}}", &[("app", "api"), ("current", "/c")]);
        assert_eq!(out, "api at /c/api");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        assert_eq!(render("{{other}}", &[("app", "api")]), "{{other}}");
    }
}
