//! The tag catalogue.
//!
//! Every recognized element name maps to a dense numeric id. Start-tag ids
//! are assigned in manifest order; the id of an end tag is always the start
//! id plus one, so that `close_tag_of(T) = T + 1` holds for the whole
//! catalogue. Ids 0..3 are reserved for the unknown tag and the two
//! pseudo-tags used by content-model evaluation.

use crate::compat::CompatMode;
use rustc_hash::FxHashMap;

/// Element may appear in inline flow.
pub const INLINE: u8 = 0x01;
/// Element establishes block flow.
pub const BLOCK: u8 = 0x02;
/// Element has no content and no end tag.
pub const EMPTY: u8 = 0x04;
/// Element body is opaque to the tokenizer up to its matching end tag.
pub const PCDATA: u8 = 0x08;
/// The id names an end tag.
pub const END: u8 = 0x10;

/// Dense numeric tag id. `TagId::TEXT` and `TagId::SPACE` never appear in
/// tokens; they exist so text can be probed through content models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u16);

impl TagId {
    pub const UNKNOWN: TagId = TagId(0);
    pub const TEXT: TagId = TagId(1);
    pub const SPACE: TagId = TagId(2);

    /// Id of the end tag closing this start tag.
    pub fn end(self) -> TagId {
        if self == TagId::UNKNOWN {
            TagId::UNKNOWN
        } else {
            TagId(self.0 + 1)
        }
    }
}

/// Ids for the tags the engine must refer to by name. Values follow from
/// manifest order; `catalogue_ids_match_constants` below keeps them honest.
pub mod tags {
    use super::TagId;

    pub const A: TagId = TagId(3);
    pub const BODY: TagId = TagId(5);
    pub const BR: TagId = TagId(7);
    pub const DD: TagId = TagId(9);
    pub const DL: TagId = TagId(11);
    pub const DT: TagId = TagId(13);
    pub const FORM: TagId = TagId(15);
    pub const FRAMESET: TagId = TagId(17);
    pub const HEAD: TagId = TagId(19);
    pub const HTML: TagId = TagId(21);
    pub const LI: TagId = TagId(23);
    pub const LISTING: TagId = TagId(25);
    pub const OL: TagId = TagId(27);
    pub const OPTION: TagId = TagId(29);
    pub const P: TagId = TagId(31);
    pub const PRE: TagId = TagId(33);
    pub const SCRIPT: TagId = TagId(35);
    pub const STYLE: TagId = TagId(37);
    pub const TABLE: TagId = TagId(39);
    pub const TD: TagId = TagId(41);
    pub const TEXTAREA: TagId = TagId(43);
    pub const TH: TagId = TagId(45);
    pub const TITLE: TagId = TagId(47);
    pub const TR: TagId = TagId(49);
    pub const UL: TagId = TagId(51);
    pub const XMP: TagId = TagId(53);
}

/// Per-tag rule deciding whether an incoming tag closes an open ancestor.
///
/// Encoded as a fixed enum rather than function pointers so the catalogue
/// stays inspectable and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentModel {
    /// All row/cell tags close this node. Attached to `form` so a form
    /// opened between table rows never swallows the rows that follow.
    Form,
    /// Only character data is legal content (`title`, `option`).
    Pcdata,
    /// Definition lists admit `dd`/`dt` and text.
    Dl,
    /// Ordered and unordered lists admit `li` and text.
    List,
    /// `body` or `frameset` closes the document head.
    Head,
    /// Inline-only containers (`p`, headings); any non-inline tag closes
    /// them, with the quirks-mode table exception.
    Inline,
    /// Anchors admit everything except another anchor.
    Anchor,
    /// Nothing implicitly closes a table except another table; stray
    /// row/cell tags are contained.
    Table,
    /// Rows close each other and nothing else.
    Row,
    /// Cells close on the next cell or row.
    Cell,
    /// List items close each other (`li`, `dd`, `dt`).
    ListItem,
}

/// Outcome of one content-model probe step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The incoming tag closes the probed ancestor.
    Close,
    /// The incoming tag is a legal child here; stop probing.
    Ok,
    /// Undecided; continue the probe at the grandparent.
    Parent,
}

impl ContentModel {
    pub fn disposition(
        self,
        ancestor: TagId,
        incoming: TagId,
        mode: CompatMode,
        catalogue: &TagCatalogue,
    ) -> Disposition {
        use tags::*;
        use Disposition::*;

        let is_text = matches!(incoming, TagId::TEXT | TagId::SPACE);

        match self {
            ContentModel::Form => {
                if matches!(incoming, TR | TD | TH) {
                    Close
                } else {
                    Parent
                }
            }

            ContentModel::Pcdata => {
                if is_text {
                    Ok
                } else {
                    Close
                }
            }

            ContentModel::Dl => {
                if matches!(incoming, DD | DT) || is_text {
                    Ok
                } else {
                    Parent
                }
            }

            ContentModel::List => {
                if incoming == LI || is_text {
                    Ok
                } else {
                    Parent
                }
            }

            ContentModel::Head => {
                if matches!(incoming, BODY | FRAMESET) {
                    Close
                } else {
                    Parent
                }
            }

            ContentModel::Inline => {
                if is_text {
                    Ok
                } else if mode == CompatMode::Quirks && ancestor == P && incoming == TABLE {
                    /* Quirks mode exception: <p> tags can contain <table>. */
                    Ok
                } else if catalogue.flags(incoming) & INLINE == 0 {
                    Close
                } else {
                    Parent
                }
            }

            ContentModel::Anchor => {
                /* The DTD restricts anchor content to "(%inline;)* -(A)",
                 * but in practice only the -(A) part is enforced anywhere.
                 */
                if is_text {
                    Ok
                } else if incoming == A {
                    Close
                } else {
                    Parent
                }
            }

            ContentModel::Table => {
                if incoming == TABLE {
                    Close
                } else {
                    Ok
                }
            }

            ContentModel::Row => {
                if incoming == TR {
                    Close
                } else {
                    Ok
                }
            }

            ContentModel::Cell => {
                if matches!(incoming, TH | TD | TR) {
                    Close
                } else {
                    Ok
                }
            }

            ContentModel::ListItem => {
                if matches!(incoming, LI | DD | DT) {
                    Close
                } else if is_text {
                    Ok
                } else {
                    Parent
                }
            }
        }
    }
}

struct TagEntry {
    name: &'static str,
    flags: u8,
    model: Option<ContentModel>,
}

/// The static manifest the catalogue is built from. The first block keeps
/// the tags named in [`tags`] at fixed positions; the remainder is
/// alphabetical.
#[rustfmt::skip]
static MANIFEST: &[(&str, u8, Option<ContentModel>)] = &[
    ("a",        INLINE,         Some(ContentModel::Anchor)),
    ("body",     BLOCK,          None),
    ("br",       INLINE | EMPTY, None),
    ("dd",       BLOCK,          Some(ContentModel::ListItem)),
    ("dl",       BLOCK,          Some(ContentModel::Dl)),
    ("dt",       BLOCK,          Some(ContentModel::ListItem)),
    ("form",     BLOCK,          Some(ContentModel::Form)),
    ("frameset", BLOCK,          None),
    ("head",     0,              Some(ContentModel::Head)),
    ("html",     BLOCK,          None),
    ("li",       BLOCK,          Some(ContentModel::ListItem)),
    ("listing",  BLOCK,          None),
    ("ol",       BLOCK,          Some(ContentModel::List)),
    ("option",   0,              Some(ContentModel::Pcdata)),
    ("p",        BLOCK,          Some(ContentModel::Inline)),
    ("pre",      BLOCK,          None),
    ("script",   INLINE | PCDATA, None),
    ("style",    PCDATA,         None),
    ("table",    BLOCK,          Some(ContentModel::Table)),
    ("td",       BLOCK,          Some(ContentModel::Cell)),
    ("textarea", INLINE | PCDATA, None),
    ("th",       BLOCK,          Some(ContentModel::Cell)),
    ("title",    0,              Some(ContentModel::Pcdata)),
    ("tr",       BLOCK,          Some(ContentModel::Row)),
    ("ul",       BLOCK,          Some(ContentModel::List)),
    ("xmp",      BLOCK | PCDATA, None),
    ("abbr",     INLINE,         None),
    ("acronym",  INLINE,         None),
    ("address",  BLOCK,          None),
    ("applet",   INLINE,         None),
    ("area",     EMPTY,          None),
    ("b",        INLINE,         None),
    ("base",     EMPTY,          None),
    ("basefont", EMPTY,          None),
    ("bdo",      INLINE,         None),
    ("big",      INLINE,         None),
    ("blockquote", BLOCK,        None),
    ("button",   INLINE,         None),
    ("caption",  0,              None),
    ("center",   BLOCK,          None),
    ("cite",     INLINE,         None),
    ("code",     INLINE,         None),
    ("col",      EMPTY,          None),
    ("colgroup", 0,              None),
    ("del",      INLINE,         None),
    ("dfn",      INLINE,         None),
    ("dir",      BLOCK,          Some(ContentModel::List)),
    ("div",      BLOCK,          None),
    ("em",       INLINE,         None),
    ("embed",    INLINE | EMPTY, None),
    ("fieldset", BLOCK,          None),
    ("font",     INLINE,         None),
    ("frame",    EMPTY,          None),
    ("h1",       BLOCK,          Some(ContentModel::Inline)),
    ("h2",       BLOCK,          Some(ContentModel::Inline)),
    ("h3",       BLOCK,          Some(ContentModel::Inline)),
    ("h4",       BLOCK,          Some(ContentModel::Inline)),
    ("h5",       BLOCK,          Some(ContentModel::Inline)),
    ("h6",       BLOCK,          Some(ContentModel::Inline)),
    ("hr",       BLOCK | EMPTY,  None),
    ("i",        INLINE,         None),
    ("iframe",   INLINE,         None),
    ("img",      INLINE | EMPTY, None),
    ("input",    INLINE | EMPTY, None),
    ("ins",      INLINE,         None),
    ("kbd",      INLINE,         None),
    ("label",    INLINE,         None),
    ("legend",   0,              None),
    ("link",     EMPTY,          None),
    ("map",      INLINE,         None),
    ("menu",     BLOCK,          Some(ContentModel::List)),
    ("meta",     EMPTY,          None),
    ("noframes", BLOCK,          None),
    ("noscript", BLOCK,          None),
    ("object",   INLINE,         None),
    ("optgroup", 0,              None),
    ("param",    EMPTY,          None),
    ("q",        INLINE,         None),
    ("s",        INLINE,         None),
    ("samp",     INLINE,         None),
    ("select",   INLINE,         None),
    ("small",    INLINE,         None),
    ("span",     INLINE,         None),
    ("strike",   INLINE,         None),
    ("strong",   INLINE,         None),
    ("sub",      INLINE,         None),
    ("sup",      INLINE,         None),
    ("tbody",    0,              None),
    ("tfoot",    0,              None),
    ("thead",    0,              None),
    ("tt",       INLINE,         None),
    ("u",        INLINE,         None),
    ("var",      INLINE,         None),
];

/// First id handed out to a manifest entry.
const FIRST_TAG: u16 = 3;

/// Longest name in the manifest; lookups longer than this fail fast.
const MAX_TAG_NAME: usize = 10;

/// Immutable per-engine name/id/flag lookup, built once at engine
/// construction.
pub struct TagCatalogue {
    by_name: FxHashMap<&'static [u8], TagId>,
    entries: Vec<TagEntry>,
}

impl TagCatalogue {
    pub fn new() -> Self {
        let mut by_name =
            FxHashMap::with_capacity_and_hasher(MANIFEST.len(), Default::default());
        let mut entries = Vec::with_capacity(MANIFEST.len());

        for (index, (name, flags, model)) in MANIFEST.iter().copied().enumerate() {
            debug_assert!(name.len() <= MAX_TAG_NAME);
            by_name.insert(name.as_bytes(), TagId(FIRST_TAG + 2 * index as u16));
            entries.push(TagEntry { name, flags, model });
        }

        Self { by_name, entries }
    }

    /// Resolves a tag name, ASCII case-insensitively.
    pub fn lookup(&self, name: &[u8]) -> Option<TagId> {
        if name.is_empty() || name.len() > MAX_TAG_NAME {
            return None;
        }
        let mut lower = [0u8; MAX_TAG_NAME];
        for (dst, src) in lower.iter_mut().zip(name) {
            *dst = src.to_ascii_lowercase();
        }
        self.by_name.get(&lower[..name.len()]).copied()
    }

    fn entry(&self, tag: TagId) -> Option<&TagEntry> {
        if tag.0 < FIRST_TAG {
            return None;
        }
        self.entries.get(usize::from((tag.0 - FIRST_TAG) / 2))
    }

    /// Flag bits for an id. End-tag ids report only `END`.
    pub fn flags(&self, tag: TagId) -> u8 {
        if self.is_end_tag(tag) {
            return END;
        }
        self.entry(tag).map(|e| e.flags).unwrap_or(0)
    }

    pub fn model(&self, tag: TagId) -> Option<ContentModel> {
        if self.is_end_tag(tag) {
            return None;
        }
        self.entry(tag).and_then(|e| e.model)
    }

    pub fn is_end_tag(&self, tag: TagId) -> bool {
        tag.0 >= FIRST_TAG && (tag.0 - FIRST_TAG) % 2 == 1
    }

    /// Canonical lowercase name; end-tag ids report their start tag's name.
    pub fn name(&self, tag: TagId) -> &'static str {
        match tag {
            TagId::UNKNOWN => "#unknown",
            TagId::TEXT => "#text",
            TagId::SPACE => "#space",
            _ => self.entry(tag).map(|e| e.name).unwrap_or("#unknown"),
        }
    }
}

impl Default for TagCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catalogue_ids_match_constants() {
        let catalogue = TagCatalogue::new();
        for (name, id) in [
            ("a", tags::A),
            ("body", tags::BODY),
            ("br", tags::BR),
            ("dd", tags::DD),
            ("dl", tags::DL),
            ("dt", tags::DT),
            ("form", tags::FORM),
            ("frameset", tags::FRAMESET),
            ("head", tags::HEAD),
            ("html", tags::HTML),
            ("li", tags::LI),
            ("listing", tags::LISTING),
            ("ol", tags::OL),
            ("option", tags::OPTION),
            ("p", tags::P),
            ("pre", tags::PRE),
            ("script", tags::SCRIPT),
            ("style", tags::STYLE),
            ("table", tags::TABLE),
            ("td", tags::TD),
            ("textarea", tags::TEXTAREA),
            ("th", tags::TH),
            ("title", tags::TITLE),
            ("tr", tags::TR),
            ("ul", tags::UL),
            ("xmp", tags::XMP),
        ] {
            assert_eq!(catalogue.lookup(name.as_bytes()), Some(id), "{name}");
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let catalogue = TagCatalogue::new();
        assert_eq!(catalogue.lookup(b"TABLE"), Some(tags::TABLE));
        assert_eq!(catalogue.lookup(b"TaBlE"), Some(tags::TABLE));
        assert_eq!(catalogue.lookup(b"nosuchtag"), None);
        assert_eq!(catalogue.lookup(b""), None);
    }

    #[test]
    fn end_tag_convention() {
        let catalogue = TagCatalogue::new();
        assert_eq!(tags::P.end(), TagId(tags::P.0 + 1));
        assert!(catalogue.is_end_tag(tags::P.end()));
        assert!(!catalogue.is_end_tag(tags::P));
        assert_eq!(catalogue.flags(tags::P.end()), END);
        assert_eq!(catalogue.name(tags::P.end()), "p");
    }

    #[test]
    fn flags_cover_the_basics() {
        let catalogue = TagCatalogue::new();
        assert_ne!(catalogue.flags(tags::BR) & EMPTY, 0);
        assert_ne!(catalogue.flags(tags::SCRIPT) & PCDATA, 0);
        assert_ne!(catalogue.flags(tags::A) & INLINE, 0);
        assert_eq!(catalogue.flags(tags::P) & INLINE, 0);
        assert_ne!(catalogue.flags(tags::P) & BLOCK, 0);
    }

    #[test]
    fn anchor_model_closes_only_anchors() {
        let catalogue = TagCatalogue::new();
        let model = catalogue.model(tags::A).unwrap();
        let mode = CompatMode::NoQuirks;
        assert_eq!(
            model.disposition(tags::A, tags::A, mode, &catalogue),
            Disposition::Close
        );
        assert_eq!(
            model.disposition(tags::A, tags::TABLE, mode, &catalogue),
            Disposition::Parent
        );
        assert_eq!(
            model.disposition(tags::A, TagId::TEXT, mode, &catalogue),
            Disposition::Ok
        );
    }

    #[test]
    fn row_and_cell_models_close_like_tags_only() {
        let catalogue = TagCatalogue::new();
        let mode = CompatMode::NoQuirks;

        let row = catalogue.model(tags::TR).unwrap();
        assert_eq!(
            row.disposition(tags::TR, tags::TR, mode, &catalogue),
            Disposition::Close
        );
        assert_eq!(
            row.disposition(tags::TR, tags::TD, mode, &catalogue),
            Disposition::Ok
        );
        // Even a nested table stays contained rather than probing upward.
        assert_eq!(
            row.disposition(tags::TR, tags::TABLE, mode, &catalogue),
            Disposition::Ok
        );

        let cell = catalogue.model(tags::TD).unwrap();
        assert_eq!(
            cell.disposition(tags::TD, tags::TR, mode, &catalogue),
            Disposition::Close
        );
        assert_eq!(
            cell.disposition(tags::TD, tags::TH, mode, &catalogue),
            Disposition::Close
        );
        assert_eq!(
            cell.disposition(tags::TD, tags::P, mode, &catalogue),
            Disposition::Ok
        );
    }

    #[test]
    fn inline_model_quirks_table_exception() {
        let catalogue = TagCatalogue::new();
        let model = catalogue.model(tags::P).unwrap();
        assert_eq!(
            model.disposition(tags::P, tags::TABLE, CompatMode::NoQuirks, &catalogue),
            Disposition::Close
        );
        assert_eq!(
            model.disposition(tags::P, tags::TABLE, CompatMode::Quirks, &catalogue),
            Disposition::Ok
        );
        assert_eq!(
            model.disposition(tags::P, catalogue.lookup(b"b").unwrap(), CompatMode::NoQuirks, &catalogue),
            Disposition::Parent
        );
    }
}
