//! Template engines: encode templated source into a surrogate the target
//! grammar can parse, and map surrogate offsets back to the raw text.
//!
//! Encoders keep byte alignment wherever they can by blanking markup to
//! spaces. When they must add text (such as a closing `end` for a block
//! that the template closes by indentation), they record a [`Boundary`] so
//! that [`Encoded::remapper`] can shift action ranges back.

pub mod erb;
pub mod haml;

pub use erb::Erb;
pub use haml::Haml;

use crate::mutation::{Action, Remap};
use crate::tree::SupportLang;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub trait TemplateEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Grammar the surrogate is written in.
    fn target_language(&self) -> SupportLang;

    fn encode(&self, raw: &str) -> Encoded;
}

/// Synthetic text introduced at `offset` (surrogate coordinates).
///
/// A positive `delta` counts inserted bytes; a negative one counts raw bytes
/// the encoder dropped at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub offset: usize,
    pub delta: isize,
}

/// A surrogate text plus the boundaries needed to map it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    surrogate: String,
    boundaries: Vec<Boundary>,
}

impl Encoded {
    pub fn new(surrogate: String, boundaries: Vec<Boundary>) -> Self {
        Self {
            surrogate,
            boundaries,
        }
    }

    /// The raw text standing in for itself.
    pub fn identity(raw: &str) -> Self {
        Self::new(raw.to_string(), Vec::new())
    }

    pub fn surrogate(&self) -> &str {
        &self.surrogate
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn is_identity(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Map a surrogate offset into the raw text.
    pub fn to_raw_offset(&self, pos: usize) -> usize {
        raw_offset(&self.boundaries, pos)
    }

    /// Remap function for a [`MutationSession`](crate::mutation::MutationSession).
    pub fn remapper(&self) -> Remap {
        let boundaries = self.boundaries.clone();
        Box::new(move |actions: &mut [Action]| {
            for action in actions.iter_mut() {
                action.start = raw_offset(&boundaries, action.start);
                action.end = raw_offset(&boundaries, action.end);
            }
        })
    }
}

/// Every boundary strictly before `pos` shifts it by its delta; positions
/// inside inserted text clamp to the boundary.
fn raw_offset(boundaries: &[Boundary], pos: usize) -> usize {
    let mut shift: isize = 0;
    for boundary in boundaries.iter().filter(|b| pos > b.offset) {
        if boundary.delta > 0 {
            let crossed = (pos - boundary.offset) as isize;
            shift += boundary.delta.min(crossed);
        } else {
            shift += boundary.delta;
        }
    }
    (pos as isize - shift).max(0) as usize
}

/// Replace every byte except line breaks with a space.
pub(crate) fn blank_into(out: &mut String, text: &str) {
    out.extend(text.bytes().map(|b| match b {
        b'\n' | b'\r' => b as char,
        _ => ' ',
    }));
}

/// Template engines keyed by file extension (without the dot).
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn TemplateEngine>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.engines.iter().map(|(ext, engine)| (ext, engine.name())))
            .finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.erb` and `.haml`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("erb", Arc::new(Erb));
        registry.register("haml", Arc::new(Haml));
        registry
    }

    pub fn register(&mut self, extension: &str, engine: Arc<dyn TemplateEngine>) {
        self.engines
            .insert(extension.trim_start_matches('.').to_string(), engine);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn TemplateEngine>> {
        self.engines.get(extension.trim_start_matches('.'))
    }

    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn TemplateEngine>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}
