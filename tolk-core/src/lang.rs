/// Supported language catalog. Input languages are full BCP 47 tags handed
/// to the recognizer; output languages are bare codes handed to the
/// translator. The pairs are static configuration, not behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub const INPUT_LANGUAGES: &[Language] = &[
    Language { code: "nl-NL", name: "Nederlands" },
    Language { code: "en-US", name: "English (US)" },
    Language { code: "en-GB", name: "English (UK)" },
    Language { code: "de-DE", name: "Deutsch" },
    Language { code: "fr-FR", name: "Français" },
    Language { code: "es-ES", name: "Español" },
    Language { code: "it-IT", name: "Italiano" },
];

pub const OUTPUT_LANGUAGES: &[Language] = &[
    Language { code: "nl", name: "Nederlands" },
    Language { code: "en", name: "English" },
    Language { code: "de", name: "Deutsch" },
    Language { code: "fr", name: "Français" },
    Language { code: "es", name: "Español" },
    Language { code: "it", name: "Italiano" },
];

pub fn input_display_name(tag: &str) -> Option<&'static str> {
    INPUT_LANGUAGES
        .iter()
        .find(|l| l.code == tag)
        .map(|l| l.name)
}

pub fn output_display_name(code: &str) -> Option<&'static str> {
    OUTPUT_LANGUAGES
        .iter()
        .find(|l| l.code == code)
        .map(|l| l.name)
}

/// Reduces a region-qualified tag to its primary language subtag:
/// "en-US" -> "en". Translators take bare language codes, not full tags.
pub fn primary_subtag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.split(['-', '_']).next().unwrap_or(tag)
}
