use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Message,
    FunctionCall,
    FunctionCallOutput,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    InputText,
    InputAudio,
    Text,
    Audio,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl ItemContent {
    fn with_text(content_type: ContentType, text: impl Into<String>) -> Self {
        Self {
            content_type,
            text: Some(text.into()),
            transcript: None,
        }
    }
}

/// A conversation item, either sent by the client or announced by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ItemRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ItemContent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Item {
    /// A user message with one `input_text` part per prompt.
    pub fn user_text<S: AsRef<str>>(prompts: &[S]) -> Self {
        Self {
            item_type: ItemType::Message,
            role: Some(ItemRole::User),
            content: Some(
                prompts
                    .iter()
                    .map(|p| ItemContent::with_text(ContentType::InputText, p.as_ref()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// An assistant-authored text message, used to surface local failures
    /// into the conversation.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            item_type: ItemType::Message,
            role: Some(ItemRole::Assistant),
            content: Some(vec![ItemContent::with_text(ContentType::Text, text)]),
            ..Default::default()
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: ItemType::FunctionCallOutput,
            call_id: Some(call_id.into()),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn is_function_call(&self) -> bool {
        self.item_type == ItemType::FunctionCall
    }
}
