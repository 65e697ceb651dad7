//! # Response Directives
//!
//! What a command handler hands back to the presentation layer: optional plain
//! text, an optional structured panel, and reactions to attach to the sent message.
//! Rendering (chat embeds, terminal output, JSON) is the presentation layer's job.

use serde::Serialize;

/// Panel accent colours, as 24-bit RGB.
pub mod colors {
    pub const POLL: u32 = 0xab0505;
    pub const CHOSEN: u32 = 0xe07d26;
    pub const RECOMMENDATIONS: u32 = 0x0dd649;
    pub const QUEUE: u32 = 0x3498db;
    pub const MOOD: u32 = 0x3498db;
    pub const HELP: u32 = 0x95a5a6;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub title: String,
    pub body: String,
    pub color: u32,
    pub fields: Vec<PanelField>,
}

impl Panel {
    #[must_use]
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            body: String::new(),
            color,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(PanelField {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<Panel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<String>,
}

impl Directive {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn panel(panel: Panel) -> Self {
        Self {
            panel: Some(panel),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reactions<I, S>(mut self, reactions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reactions.extend(reactions.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.panel.is_none() && self.reactions.is_empty()
    }
}
