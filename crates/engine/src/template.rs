//! Jinja2-style template rendering using minijinja.
//!
//! Renders email subjects/bodies and AI prompts against the execution's
//! working memory (`{{ contact.first_name }}`, `{{ context.lastCondition.result }}`).

use minijinja::Environment;

use crate::error::{EngineError, EngineResult};

/// Template renderer over a shared minijinja environment.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Render a template string with the given context.
    ///
    /// Strings without template syntax pass through untouched, so plain
    /// subject lines and prompts never pay for a parse.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> EngineResult<String> {
        if !contains_template_syntax(template) {
            return Ok(template.to_string());
        }

        let tmpl = self
            .env
            .template_from_str(template)
            .map_err(|e| EngineError::Template(format!("template parse error: {}", e)))?;

        tmpl.render(context)
            .map_err(|e| EngineError::Template(format!("template render error: {}", e)))
    }
}

/// Check whether a string contains template syntax.
fn contains_template_syntax(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}
