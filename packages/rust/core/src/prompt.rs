//! Prompt assembly for the external generator, and wrapping of its output.

use blockctx_shared::{PromptConfig, Result, Snippet, to_json_indented};

/// Renders the generator prompt from selected context and a request.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(&PromptConfig::default())
    }
}

impl PromptTemplate {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            system: config.system.trim_end().to_string(),
        }
    }

    /// Layout:
    /// ```text
    /// ### System:
    /// <system>
    ///
    /// ### Library Dictionary (JSON):
    /// <snippets>
    ///
    /// ### User Input:
    /// <request>
    ///
    /// ### Response (XML):
    /// ```
    pub fn render(&self, context: &[Snippet], user_input: &str) -> Result<String> {
        let context = to_json_indented(context)?;
        Ok(format!(
            "### System:\n{}\n\n### Library Dictionary (JSON):\n{}\n\n### User Input:\n{}\n\n### Response (XML):\n",
            self.system,
            context,
            user_input.trim()
        ))
    }
}

/// Stop sequence the generator should be given; its output ends inside the data slot.
pub const GENERATION_STOP: &str = "</FrameworkBuilder.ActualDataSlot>";

/// Embed generated operation blocks in a complete sequence document.
pub fn wrap_generated_xml(generated: &str) -> String {
    let body = generated.trim();
    let body = body.strip_suffix(GENERATION_STOP).unwrap_or(body).trim_end();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Standard.Sequence name="Test_Sequence_Generated">
    <library-description>Generated by AI Model</library-description>
    <subsystems>
        <FrameworkBuilder.Frame name="Test_Frame_Main">
            <library-description>To execute subsystems sequentially.</library-description>
            <subsystems>
                <FrameworkBuilder.ActualDataSlot name="Data">
                    <subsystems>
{body}
                    </subsystems>
                </FrameworkBuilder.ActualDataSlot>
            </subsystems>
        </FrameworkBuilder.Frame>
    </subsystems>
</Standard.Sequence>"#
    )
}
