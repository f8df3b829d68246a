use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

use crate::model::RuntimeVariables;

/// Variable reference inside a prompt
/// Format: `@name`, where `name` is one or more ascii word characters
const VARIABLE_PATTERN: &str = r"@([A-Za-z0-9_]+)";

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(VARIABLE_PATTERN).unwrap());

/// Substitute every `@key` whose key exists in `variables`.
///
/// Unknown references are left in place so they stay visible in the rendered prompt.
pub fn resolve(
    template: &str,
    variables: &HashMap<String, String>,
) -> String {
    if variables.is_empty() {
        return template.to_string();
    }

    VARIABLE_RE
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Build the variable snapshot for a node prompt and resolve it.
///
/// Runtime answers win over project variables on key collision.
pub fn resolve_node_prompt(
    template: &str,
    project_variables: &HashMap<String, String>,
    runtime_variables: &RuntimeVariables,
) -> String {
    resolve(template, &merge_variables(project_variables, runtime_variables))
}

/// Flatten runtime answers over project variables into one string map.
pub fn merge_variables(
    project_variables: &HashMap<String, String>,
    runtime_variables: &RuntimeVariables,
) -> HashMap<String, String> {
    let mut merged = project_variables.clone();
    for (key, var) in runtime_variables {
        merged.insert(key.clone(), var.value.to_string());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, RuntimeVariable};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_resolve_no_variables() {
        let template = "Hello @name, mail me at a@b.com";
        assert_eq!(resolve(template, &HashMap::new()), template);
    }

    #[test]
    fn test_resolve_known_variable() {
        let result = resolve("You are @persona. Greet @visitor.", &vars(&[("persona", "a tour guide"), ("visitor", "Ada")]));
        assert_eq!(result, "You are a tour guide. Greet Ada.");
    }

    #[test]
    fn test_resolve_unknown_variable_left_in_place() {
        let result = resolve("Hi @name and @missing", &vars(&[("name", "Bob")]));
        assert_eq!(result, "Hi Bob and @missing");
    }

    #[test]
    fn test_resolve_longest_word_token() {
        // `@name_full` is its own token and does not match `name`
        let result = resolve("@name_full / @name", &vars(&[("name", "x")]));
        assert_eq!(result, "@name_full / x");
    }

    #[test]
    fn test_resolve_empty_value_substituted() {
        let result = resolve("[@blank]", &vars(&[("blank", "")]));
        assert_eq!(result, "[]");
    }

    #[test]
    fn test_resolve_repeated_token() {
        let result = resolve("@a-@a-@a", &vars(&[("a", "1")]));
        assert_eq!(result, "1-1-1");
    }

    #[test]
    fn test_runtime_variables_win() {
        let project = vars(&[("name", "A"), ("company", "Acme")]);
        let mut runtime = RuntimeVariables::new();
        runtime.insert(
            "name".to_string(),
            RuntimeVariable {
                value: AnswerValue::from("B"),
                question_text: "Name?".to_string(),
            },
        );

        assert_eq!(resolve_node_prompt("@name at @company", &project, &runtime), "B at Acme");
    }

    #[test]
    fn test_array_answers_are_joined() {
        let mut runtime = RuntimeVariables::new();
        runtime.insert(
            "topics".to_string(),
            RuntimeVariable {
                value: AnswerValue::Choices(vec!["pricing".to_string(), "support".to_string()]),
                question_text: "Topics?".to_string(),
            },
        );

        assert_eq!(resolve_node_prompt("Discuss @topics", &HashMap::new(), &runtime), "Discuss pricing, support");
    }
}
