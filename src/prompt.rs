//! Prompt Composition - Style and Modifier Expansion
//!
//! Pure and total: composition never fails. Unknown modifier names are
//! treated as "no modifier selected".

use serde::{Deserialize, Serialize};

use crate::templates::Template;

const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// The user's chosen modifier names, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifierSelection {
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub atmosphere: Option<String>,
}

impl ModifierSelection {
    pub fn is_empty(&self) -> bool {
        self.style.is_none() && self.lighting.is_none() && self.atmosphere.is_none()
    }
}

/// Expand a raw prompt through the template's modifier tables.
///
/// Style text substitutes `{prompt}` exactly once (no recursive expansion);
/// style text without the placeholder is appended as a suffix. Lighting and
/// atmosphere are appended afterwards, in that fixed order, comma-joined.
pub fn compose_prompt(template: &Template, raw_prompt: &str, selection: &ModifierSelection) -> String {
    let mut prompt = raw_prompt.to_string();

    if let Some(style_text) = lookup(&template.style_templates, selection.style.as_deref()) {
        prompt = if style_text.contains(PROMPT_PLACEHOLDER) {
            style_text.replacen(PROMPT_PLACEHOLDER, raw_prompt, 1)
        } else {
            format!("{prompt}, {style_text}")
        };
    }

    for table in [
        lookup(&template.lighting_modifiers, selection.lighting.as_deref()),
        lookup(&template.atmosphere_modifiers, selection.atmosphere.as_deref()),
    ]
    .into_iter()
    .flatten()
    {
        prompt = format!("{prompt}, {table}");
    }

    prompt
}

fn lookup<'a>(
    table: &'a std::collections::BTreeMap<String, String>,
    name: Option<&str>,
) -> Option<&'a str> {
    name.and_then(|n| table.get(n)).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_with_modifiers() -> Template {
        serde_json::from_str(
            r#"{
                "id": "t1",
                "name": "Test",
                "parameters": {
                    "prompt": {"type": "string", "default": ""}
                },
                "style_templates": {
                    "cinematic": "cinematic film still of {prompt}, shallow depth of field",
                    "plain_suffix": "oil painting"
                },
                "lighting_modifiers": {
                    "golden_hour": "golden hour lighting"
                },
                "atmosphere_modifiers": {
                    "foggy": "dense fog"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn no_modifiers_returns_prompt_verbatim() {
        let t = template_with_modifiers();
        let out = compose_prompt(&t, "a red fox", &ModifierSelection::default());
        assert_eq!(out, "a red fox");
    }

    #[test]
    fn style_substitutes_placeholder_once() {
        let t = template_with_modifiers();
        let selection = ModifierSelection {
            style: Some("cinematic".to_string()),
            ..Default::default()
        };
        let out = compose_prompt(&t, "a red fox", &selection);
        assert_eq!(out, "cinematic film still of a red fox, shallow depth of field");
    }

    #[test]
    fn substitution_is_not_recursive() {
        let t = template_with_modifiers();
        let selection = ModifierSelection {
            style: Some("cinematic".to_string()),
            ..Default::default()
        };
        // A raw prompt containing the placeholder text must survive as-is.
        let out = compose_prompt(&t, "a sign reading {prompt}", &selection);
        assert_eq!(
            out,
            "cinematic film still of a sign reading {prompt}, shallow depth of field"
        );
    }

    #[test]
    fn style_without_placeholder_is_a_suffix() {
        let t = template_with_modifiers();
        let selection = ModifierSelection {
            style: Some("plain_suffix".to_string()),
            ..Default::default()
        };
        let out = compose_prompt(&t, "a red fox", &selection);
        assert_eq!(out, "a red fox, oil painting");
    }

    #[test]
    fn lighting_precedes_atmosphere() {
        let t = template_with_modifiers();
        let selection = ModifierSelection {
            style: Some("cinematic".to_string()),
            lighting: Some("golden_hour".to_string()),
            atmosphere: Some("foggy".to_string()),
        };
        let out = compose_prompt(&t, "a red fox", &selection);
        assert_eq!(
            out,
            "cinematic film still of a red fox, shallow depth of field, golden hour lighting, dense fog"
        );
    }

    #[test]
    fn unknown_modifier_names_fall_back_to_no_modifier() {
        let t = template_with_modifiers();
        let selection = ModifierSelection {
            style: Some("does_not_exist".to_string()),
            lighting: Some("also_missing".to_string()),
            atmosphere: None,
        };
        let out = compose_prompt(&t, "a red fox", &selection);
        assert_eq!(out, "a red fox");
    }
}
