//! Remote App Layout
//!
//! Describes the control pages a connected app should draw: pages hold
//! cards, cards hold buttons. A button with a command sends that command
//! back when pressed; a button with an id is a text field the host updates.

use serde::{Deserialize, Serialize};

/// Prefix of a serialized layout on the wire
pub const LAYOUT_PREFIX: &str = "JSON=";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub width: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    pub buttons: Vec<Button>,
}

impl Card {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buttons: Vec::new(),
        }
    }

    pub fn button(mut self, label: &str, cmd: &str, id: &str, width: u8) -> Self {
        self.buttons.push(Button {
            label: label.to_string(),
            cmd: cmd.to_string(),
            id: id.to_string(),
            width,
        });
        self
    }

    /// `-` / value / `+` row bound to a pair of commands
    pub fn stepper(self, decrease: &str, id: &str, increase: &str) -> Self {
        self.button("-", decrease, "", 2)
            .button("", "", id, 8)
            .button("+", increase, "", 2)
    }

    /// Label next to a read-only value
    pub fn constant(self, label: &str, id: &str) -> Self {
        self.button(label, "", "", 4).button("", "", id, 8)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<Card>,
    /// Pages the app already knows how to draw
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub predefined: bool,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cards: Vec::new(),
            predefined: false,
        }
    }

    pub fn predefined(title: impl Into<String>) -> Self {
        Self {
            predefined: true,
            ..Self::new(title)
        }
    }

    pub fn card(mut self, card: Card) -> Self {
        self.cards.push(card);
        self
    }
}

/// The whole layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteLayout {
    pub pages: Vec<Page>,
}

impl RemoteLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    /// Adaptation controls, read-only constants, a globals page with
    /// `global_cards`, and the app's plotter and monitor
    pub fn tuning_panel(global_cards: Vec<Card>) -> Self {
        let tuning = Page::new("AFC Parameters")
            .card(Card::new("Mu (Step Size)").stepper("M", "valMu", "m"))
            .card(Card::new("Eps (Power Tolerance)").stepper("E", "valEps", "e"))
            .card(Card::new("Rho (Forgetting Factor)").stepper("R", "valRho", "r"))
            .card(
                Card::new("Constants")
                    .constant("AFL", "valAFL")
                    .constant("WFL", "valWFL")
                    .constant("PFL", "valPFL")
                    .constant("FBL", "valFBL")
                    .constant("HDEL", "valHDEL")
                    .constant("ALF", "valALF"),
            );

        let mut globals = Page::new("Globals");
        globals.cards = global_cards;

        Self::new()
            .page(tuning)
            .page(globals)
            .page(Page::predefined("serialPlotter"))
            .page(Page::predefined("serialMonitor"))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// `JSON=` followed by the compact layout
    pub fn to_wire(&self) -> String {
        // Plain structs of strings and integers always serialize
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", LAYOUT_PREFIX, body)
    }
}

/// Message that replaces the text of the button with `id`
pub fn button_text(id: &str, text: &str) -> String {
    format!("TEXT=BTN:{}:{}", id, text)
}
