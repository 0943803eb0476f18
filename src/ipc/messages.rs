//! Messages exchanged with connected pages

use serde::{Deserialize, Serialize};

/// Tagged message on a page channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action")]
pub enum ChannelMessage {
    /// Page asks for its stylesheet
    #[serde(rename = "getCSS")]
    GetCss,

    /// Stylesheet for the page
    #[serde(rename = "updateCSS")]
    UpdateCss { css: String },

    /// Styles changed; the page should ask again
    #[serde(rename = "queryCSS")]
    QueryCss,
}
