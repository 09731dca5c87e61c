use crate::catalog::DefectRecord;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt template references unknown placeholder {{{{{0}}}}}")]
    UnresolvedPlaceholder(String),
    #[error("prompt template has an unclosed placeholder")]
    UnclosedPlaceholder,
}

const GENERIC_GUIDANCE: &str = "- Change only the lines needed to fix this bug; leave everything else untouched.";
const NO_STATIC_ANALYSIS: &str = "No static analysis available.";
const NO_EXCERPTS: &str = "(none of the affected files were found in the codebase snapshot)";
const NO_PREVIOUS_CODE: &str = "(no code was generated in the previous attempt)";

pub const FIX_PROMPT_TEMPLATE: &str = r#"Provide **ONLY the corrected code snippet(s)** to fix a specific bug in this Django/React application.
**Your primary goal is minimality and precision.** Do NOT rewrite entire functions/components, change unrelated lines, or alter API/function signatures unless explicitly necessary for the bug and justified by the analysis.
Add functions or variables only when strictly necessary and locally scoped to the fix. **DO NOT remove or modify any code not directly related to fixing this specific bug.**

**BUG NAME:** {{bug_name}}
**DESCRIPTION:** {{description}}
**ROOT CAUSE:** {{root_cause}}
**FIX CONCEPT:** {{fix_concept}}
**AFFECTED FILES:** {{affected_files}}

**ANALYSIS HINTS (Specific guidance on what and what NOT to change):**
{{guidance}}

**STATIC ANALYSIS OF AFFECTED FILES:**
{{static_analysis}}

**CODE CONTEXT (original, buggy files for reference):**
{{relevant_content}}

**STRICT OUTPUT FORMAT (CRITICAL TO FOLLOW):**
- Output ONLY corrected code snippets.
- For each affected file, start with: `File: <file_path>`
- Immediately follow with a markdown code block (e.g., ```python or ```typescript).
- Inside the code block:
    - Include only the **minimal set of lines that are changed, added, or deleted**.
    - Provide **exactly 1 to 3 lines of *unchanged* surrounding context** (before and after your change) to show precisely where the modification fits.
    - **DO NOT rewrite entire functions, methods, or components.**
    - **DO NOT change function/method signatures** unless the bug is *specifically* about an incorrect signature for that function.
    - **DO NOT remove or modify any code not directly related to fixing this specific bug.**
    - Ensure all generated code is syntactically correct and directly solves the bug.
- Close each code block with '```'.
- **DO NOT include diff markers** (`--- a/`, `+++ b/`, `@@`).
- **DO NOT provide ANY explanations, conversational text, or content outside these formatted code blocks.**
- Use separate 'File:' blocks for multiple files if applicable.

**OUTPUT EXAMPLE (Minimal, targeted change):**
File: frontend/src/components/SomeComponent.tsx
```typescript
  const existingLine = 'value';
  const [data, setData] = useState<DataType>([]);
  function anotherFunction() { /* ... */ }
```

File: backend/some_app/views.py
```python
class SomeView(APIView):
    def get(self, request):
        return MyModel.objects.filter(user=request.user)
```
"#;

pub const FAILURE_PROMPT_TEMPLATE: &str = r#"An automated attempt to generate a fix for a bug in this Django/React application failed.
Analyze why it failed and provide an improved solution.

**BUG NAME:** {{bug_name}}
**DESCRIPTION:** {{description}}
**ROOT CAUSE:** {{root_cause}}
**FIX CONCEPT:** {{fix_concept}}
**AFFECTED FILES:** {{affected_files}}

**ERROR FROM THE PREVIOUS ATTEMPT:**
{{previous_error}}

**CODE GENERATED BY THE PREVIOUS ATTEMPT:**
{{previous_code}}

**CODE CONTEXT (original, buggy files for reference):**
{{relevant_content}}

**YOUR TASK:**
1. **FAILURE ANALYSIS:** In a few sentences, explain the most likely reason the previous attempt failed (API problem, wrong output format, incorrect or incomplete fix).
2. **IMPROVED SOLUTION:** Provide a corrected, minimal patch for the bug.
   - For each affected file, start with: `File: <file_path>` followed by a markdown code block.
   - Include only changed lines plus 1 to 3 lines of unchanged surrounding context.
   - **DO NOT include diff markers** (`--- a/`, `+++ b/`, `@@`).
3. **VERIFICATION:** List how to confirm the fix works once applied.
"#;

/// Substitute `{{key}}` placeholders in one pass over the template.
///
/// Values are inserted verbatim and never rescanned, so code containing `{{`
/// is safe. Any placeholder without a value is an error.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let capacity = template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>();
    let mut out = String::with_capacity(capacity);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or(PromptError::UnclosedPlaceholder)?;
        let key = after[..end].trim();
        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| PromptError::UnresolvedPlaceholder(key.to_string()))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Prompt asking for a minimal patch for `defect`.
pub fn build_fix_prompt(
    defect: &DefectRecord,
    relevant_excerpts: &str,
    prior_analysis: &str,
) -> Result<String, PromptError> {
    let affected_files = defect.affected_paths.join(", ");
    let guidance = defect.guidance.as_deref().unwrap_or(GENERIC_GUIDANCE);

    fill_template(
        FIX_PROMPT_TEMPLATE,
        &[
            ("bug_name", &defect.name),
            ("description", &defect.description),
            ("root_cause", &defect.root_cause),
            ("fix_concept", &defect.fix_summary),
            ("affected_files", &affected_files),
            ("guidance", or_placeholder(guidance, GENERIC_GUIDANCE)),
            ("static_analysis", or_placeholder(prior_analysis, NO_STATIC_ANALYSIS)),
            ("relevant_content", or_placeholder(relevant_excerpts, NO_EXCERPTS)),
        ],
    )
}

/// Prompt asking why the previous attempt failed and for a better patch.
pub fn build_failure_prompt(
    defect: &DefectRecord,
    prior_error: &str,
    prior_code: &str,
    relevant_excerpts: &str,
) -> Result<String, PromptError> {
    let affected_files = defect.affected_paths.join(", ");
    let previous_code = if prior_code.trim().is_empty() {
        NO_PREVIOUS_CODE.to_string()
    } else {
        format!("```\n{}\n```", prior_code.trim_end())
    };

    fill_template(
        FAILURE_PROMPT_TEMPLATE,
        &[
            ("bug_name", &defect.name),
            ("description", &defect.description),
            ("root_cause", &defect.root_cause),
            ("fix_concept", &defect.fix_summary),
            ("affected_files", &affected_files),
            ("previous_error", or_placeholder(prior_error, "Unknown error")),
            ("previous_code", &previous_code),
            ("relevant_content", or_placeholder(relevant_excerpts, NO_EXCERPTS)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defect() -> DefectRecord {
        DefectRecord::new(
            "Test Bug 1",
            "This is a test bug description.",
            &[
                "frontend/src/components/TestFile.tsx",
                "backend/models/AnotherFile.py",
            ],
            "Test root cause.",
            "Test fix concept.",
        )
        .with_guidance("- Only touch TestComponent.")
    }

    #[test]
    fn test_fix_prompt_substitutes_every_field() {
        let prompt = build_fix_prompt(&defect(), "EXCERPTS-BLOCK", "ANALYSIS-BLOCK").unwrap();

        assert!(prompt.contains("**BUG NAME:** Test Bug 1"));
        assert!(prompt.contains("**DESCRIPTION:** This is a test bug description."));
        assert!(prompt.contains("**ROOT CAUSE:** Test root cause."));
        assert!(prompt.contains("**FIX CONCEPT:** Test fix concept."));
        assert!(prompt.contains(
            "**AFFECTED FILES:** frontend/src/components/TestFile.tsx, backend/models/AnotherFile.py"
        ));
        assert!(prompt.contains("- Only touch TestComponent."));
        assert!(prompt.contains("ANALYSIS-BLOCK"));
        assert!(prompt.contains("EXCERPTS-BLOCK"));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("}}"));
        assert!(!prompt.contains("{bug_name}"));
    }

    #[test]
    fn test_fix_prompt_is_deterministic() {
        let a = build_fix_prompt(&defect(), "x", "y").unwrap();
        let b = build_fix_prompt(&defect(), "x", "y").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fix_prompt_fills_in_missing_sections() {
        let mut record = defect();
        record.guidance = None;
        let prompt = build_fix_prompt(&record, "", "  ").unwrap();
        assert!(prompt.contains(GENERIC_GUIDANCE));
        assert!(prompt.contains(NO_STATIC_ANALYSIS));
        assert!(prompt.contains(NO_EXCERPTS));
    }

    #[test]
    fn test_failure_prompt_substitutes_every_field() {
        let prompt = build_failure_prompt(
            &defect(),
            "No valid code snippet generated after max retries",
            "const x = 1;",
            "EXCERPTS-BLOCK",
        )
        .unwrap();

        assert!(prompt.contains("**BUG NAME:** Test Bug 1"));
        assert!(prompt.contains("No valid code snippet generated after max retries"));
        assert!(prompt.contains("```\nconst x = 1;\n```"));
        assert!(prompt.contains("EXCERPTS-BLOCK"));
        assert!(prompt.contains("FAILURE ANALYSIS"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_failure_prompt_without_previous_code() {
        let prompt = build_failure_prompt(&defect(), "", "", "ctx").unwrap();
        assert!(prompt.contains(NO_PREVIOUS_CODE));
        assert!(prompt.contains("Unknown error"));
    }

    #[test]
    fn test_fill_template_rejects_unknown_placeholder() {
        let err = fill_template("hello {{name}} and {{other}}", &[("name", "x")]).unwrap_err();
        assert_eq!(err, PromptError::UnresolvedPlaceholder("other".to_string()));
        assert_eq!(err.to_string(), "prompt template references unknown placeholder {{other}}");
    }

    #[test]
    fn test_fill_template_rejects_unclosed_placeholder() {
        assert_eq!(
            fill_template("oops {{name", &[("name", "x")]),
            Err(PromptError::UnclosedPlaceholder)
        );
    }

    #[test]
    fn test_fill_template_does_not_rescan_values() {
        let out = fill_template("<{{code}}>", &[("code", "{{ jsx }}")]).unwrap();
        assert_eq!(out, "<{{ jsx }}>");
    }

    #[test]
    fn test_templates_only_use_known_placeholders() {
        let fix_keys = [
            "bug_name",
            "description",
            "root_cause",
            "fix_concept",
            "affected_files",
            "guidance",
            "static_analysis",
            "relevant_content",
        ];
        let vars: Vec<(&str, &str)> = fix_keys.iter().map(|k| (*k, "v")).collect();
        assert!(fill_template(FIX_PROMPT_TEMPLATE, &vars).is_ok());
    }
}
