//! System and user prompt construction for one segment.

use serde_json::Value;

use crate::chat::{ContentPart, ImageUrl, Message};
use crate::document::Segment;

const ROLE_INSTRUCTIONS: &str = "You are a data extraction assistant. \
Your task is to extract structured data from documents according to a given schema.";

const OUTPUT_RULES: &str = "Return the result as valid JSON that conforms to the provided JSON Schema.
 - For nested objects, include all required nested fields
 - For arrays, include all array items with their proper structure
 - Ensure all data types match the schema specifications
 - If no data can be extracted, return an empty code fence, do not make up data.";

const OUTPUT_FORMAT_REMINDER: &str = "IMPORTANT: Return ONLY the JSON data that matches the schema. \
Do not include the schema itself in your response. \
Return ONLY valid JSON wrapped by code fences ```. \
Do not include any explanatory text outside the JSON.";

const INTERMEDIATE_SEGMENT: &str = "IMPORTANT: The provided content is a segment of a whole document. \
Please make best effort to extract the content. \
If you can identify one incomplete object, keep it and use %missing% to mark the missing attributes in your output. \
If you can fill in the missing part of previous objects, delete the %missing% mark and complete it in full.";

const FINAL_SEGMENT: &str = "IMPORTANT: The provided content is a segment of a whole document, \
and this is the final segment of the data. \
Please make best effort to extract the content. \
Please fill in all the %missing% attributes.";

/// Builds the two opening messages of a segment conversation.
pub struct PromptBuilder<'a> {
    schema: &'a Value,
    tool_prompt: &'a str,
    multiple_per_file: bool,
}

impl<'a> PromptBuilder<'a> {
    /// Creates a builder for one run.
    #[must_use]
    pub const fn new(schema: &'a Value, tool_prompt: &'a str, multiple_per_file: bool) -> Self {
        Self {
            schema,
            tool_prompt,
            multiple_per_file,
        }
    }

    /// System prompt for `segment`.
    #[must_use]
    pub fn system(&self, segment: &Segment) -> String {
        let segmented = segment.total > 1;
        let scope = if segmented { "the provided content" } else { "this content" };
        let quantity = if self.multiple_per_file {
            format!(
                "Extract ALL matching records from {scope}. Return multiple code fences if there are multiple."
            )
        } else {
            format!("Extract ONE record from {scope}, wrapped by a code fence.")
        };
        let schema =
            serde_json::to_string_pretty(self.schema).unwrap_or_else(|_| self.schema.to_string());

        let mut prompt = String::new();
        prompt.push_str(ROLE_INSTRUCTIONS);
        prompt.push_str("\n\nSchema: Extract data according to the following JSON Schema:\n");
        prompt.push_str(&schema);
        prompt.push_str("\n\nInstructions: ");
        prompt.push_str(&quantity);
        prompt.push('\n');
        prompt.push_str(OUTPUT_RULES);
        prompt.push_str("\n\n");

        let tools = self.tool_prompt.trim();
        if !tools.is_empty() {
            prompt.push_str(tools);
            prompt.push_str("\n\n");
        }

        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        if segmented {
            prompt.push_str("\n\n");
            prompt.push_str(if segment.is_last() {
                FINAL_SEGMENT
            } else {
                INTERMEDIATE_SEGMENT
            });
        }
        prompt
    }

    /// User prompt text for `segment`.
    #[must_use]
    pub fn user_text(file_name: &str, segment: &Segment, carry: &str) -> String {
        let mut prompt = if segment.total > 1 {
            format!(
                "File: {file_name} (Segment {} of {})\n\n",
                segment.number(),
                segment.total
            )
        } else {
            format!("File: {file_name}\n\n")
        };
        if !carry.is_empty() {
            prompt.push_str("Previous Partial Objects: ");
            prompt.push_str(carry);
            prompt.push_str("\n\n");
        }
        if let Some(text) = segment.text.as_deref().filter(|t| !t.is_empty()) {
            prompt.push_str("Content:\n ");
            prompt.push_str(text);
        }
        prompt
    }

    /// User message for `segment`, with its images attached as parts.
    #[must_use]
    pub fn user(file_name: &str, segment: &Segment, carry: &str) -> Message {
        let mut parts = vec![ContentPart::Text {
            text: Self::user_text(file_name, segment, carry),
        }];
        parts.extend(segment.images.iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        }));
        Message::user_parts(parts)
    }
}
