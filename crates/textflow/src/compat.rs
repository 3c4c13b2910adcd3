/// Document compatability mode.
///
/// Mostly a styling concern, but the mode changes parsing and layout in two
/// places: in quirks mode a `<table>` start tag opens the table as a child
/// of an open `p` element instead of closing it, and outside of no-quirks
/// mode line boxes containing no text take their height from replaced boxes
/// alone.
///
/// @see https://developer.mozilla.org/en-US/docs/Web/HTML/Quirks_Mode_and_Standards_Mode
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum CompatMode {
    /// "Standards" mode; the behavior described by the modern HTML and CSS
    /// specifications.
    #[default]
    NoQuirks,

    /// Emulates legacy browser behavior for documents written before the
    /// widespread adoption of web standards.
    Quirks,

    LimitedQuirks,
}

impl From<&CompatMode> for &'static str {
    fn from(val: &CompatMode) -> Self {
        match val {
            CompatMode::NoQuirks => "no-quirks",
            CompatMode::Quirks => "quirks",
            CompatMode::LimitedQuirks => "limited-quirks",
        }
    }
}
