//! Stylesheet generation for a resolved profile
//!
//! [`build`] turns a profile into rules whose declarations are tagged as
//! width- or color-related. [`generate`] renders them as-is (preview);
//! [`enforce_precedence`] is a separate pass that marks declarations
//! `!important` unless the profile lets page styles override that
//! category, and [`generate_applied`] renders the result of that pass.

use crate::constants::style::{AUTO_WIDTH_PX, DARK_BUTTON_COLOR, LIGHT_BUTTON_COLOR, THIN_WIDTH_PX};
use crate::profile::{Buttons, OverrideMode, Profile, Width};

/// What a declaration controls, for override purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Width,
    Color,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: &'static str,
    pub value: String,
    pub category: Category,
    pub important: bool,
}

impl Declaration {
    fn new(property: &'static str, value: impl Into<String>, category: Category) -> Self {
        Self {
            property,
            value: value.into(),
            category,
            important: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub selector: &'static str,
    pub declarations: Vec<Declaration>,
}

/// Rules for `profile`, without importance markers
pub fn build(profile: &Profile) -> Vec<CssRule> {
    use Category::{Color, Width as W};

    if profile.width == Width::None {
        return vec![
            CssRule {
                selector: "*",
                declarations: vec![Declaration::new("scrollbar-width", "none", W)],
            },
            CssRule {
                selector: "::-webkit-scrollbar",
                declarations: vec![Declaration::new("display", "none", W)],
            },
        ];
    }

    let mut rules = Vec::new();

    // Standard properties
    let mut standard = Vec::new();
    match profile.width {
        Width::Thin => standard.push(Declaration::new("scrollbar-width", "thin", W)),
        Width::Auto | Width::Unset => standard.push(Declaration::new("scrollbar-width", "auto", W)),
        Width::Other | Width::None => {}
    }
    if let Some(colors) = &profile.colors {
        standard.push(Declaration::new(
            "scrollbar-color",
            format!("{} {}", colors.thumb, colors.track),
            Color,
        ));
    }
    if !standard.is_empty() {
        rules.push(CssRule {
            selector: "*",
            declarations: standard,
        });
    }

    // Engines without the standard properties
    let size = match profile.width {
        Width::Thin => format!("{THIN_WIDTH_PX}px"),
        Width::Other => profile.custom_width(),
        _ => format!("{AUTO_WIDTH_PX}px"),
    };
    rules.push(CssRule {
        selector: "::-webkit-scrollbar",
        declarations: vec![
            Declaration::new("width", size.clone(), W),
            Declaration::new("height", size, W),
        ],
    });

    if let Some(colors) = &profile.colors {
        rules.push(CssRule {
            selector: "::-webkit-scrollbar-track",
            declarations: vec![Declaration::new("background-color", colors.track.clone(), Color)],
        });
    }

    let mut thumb = Vec::new();
    if let Some(colors) = &profile.colors {
        thumb.push(Declaration::new("background-color", colors.thumb.clone(), Color));
    }
    if profile.thumb_radius > 0 {
        thumb.push(Declaration::new(
            "border-radius",
            format!("{}%", profile.thumb_radius),
            Color,
        ));
    }
    if !thumb.is_empty() {
        rules.push(CssRule {
            selector: "::-webkit-scrollbar-thumb",
            declarations: thumb,
        });
    }

    let buttons = match profile.buttons {
        Buttons::None => vec![Declaration::new("display", "none", W)],
        style => {
            let background = match (&profile.colors, style) {
                (Some(colors), _) => colors.track.clone(),
                (None, Buttons::Dark) => DARK_BUTTON_COLOR.to_string(),
                (None, _) => LIGHT_BUTTON_COLOR.to_string(),
            };
            vec![
                Declaration::new("display", "block", W),
                Declaration::new("background-color", background, Color),
            ]
        }
    };
    rules.push(CssRule {
        selector: "::-webkit-scrollbar-button",
        declarations: buttons,
    });

    rules
}

/// Mark every declaration the page may not override as `!important`
pub fn enforce_precedence(rules: Vec<CssRule>, allow: OverrideMode) -> Vec<CssRule> {
    rules
        .into_iter()
        .map(|mut rule| {
            for decl in &mut rule.declarations {
                decl.important = match decl.category {
                    Category::Width => !allow.width,
                    Category::Color => !allow.color,
                };
            }
            rule
        })
        .collect()
}

/// CSS text for `rules`, one declaration per line
pub fn render(rules: &[CssRule]) -> String {
    let mut css = String::new();
    for rule in rules {
        css.push_str(&format!("{} {{\n", rule.selector));
        for decl in &rule.declarations {
            let important = if decl.important { " !important" } else { "" };
            css.push_str(&format!("  {}: {}{};\n", decl.property, decl.value, important));
        }
        css.push_str("}\n");
    }
    css
}

/// Preview stylesheet: no override handling
pub fn generate(profile: &Profile) -> String {
    render(&build(profile))
}

/// Stylesheet injected into pages, honouring `allowOverride`
pub fn generate_applied(profile: &Profile) -> String {
    render(&enforce_precedence(build(profile), profile.allow_override))
}
