//! textflow: the core of an HTML document engine.
//!
//! Three cooperating components: a restartable [`tokenizer`] over a
//! growable document buffer, a forgiving tree builder in [`engine`] that
//! infers implicit end tags from per-element content models, and the
//! [`inline`] layout engine that packs inline boxes into pixel-precise
//! line boxes. Style computation, block layout, and painting are external
//! collaborators behind the seams in [`style`] and [`canvas`].

#[macro_use]
mod macros;
mod str_fns;

pub mod canvas;
pub mod compat;
pub mod dom;
pub mod engine;
pub mod errors;
pub mod inline;
pub mod style;
pub mod tag;
pub mod token;
pub mod tokenizer;

pub use compat::CompatMode;
pub use engine::{DocumentObserver, Engine, EngineOptions};
pub use errors::EngineError;
pub use inline::{
    InlineBorder, InlineContext, InlineMetrics, LineBox, LineBoxResult, FORCE_BOX, FORCE_LINE,
};
pub use style::{ComputedValues, TextMeasure};
