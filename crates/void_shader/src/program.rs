//! Selected programs and the per-pass program cache
//!
//! A `Program` stands in for the compiled GPU program of one shader variant.
//! Compiling is the GPU backend's business; here a program is identity plus
//! the variant that produced it, which is all a draw call needs to bind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::variants::ShaderVariant;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Unique program identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl ProgramId {
    fn next() -> Self {
        Self(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A program selected for one variant of one pass
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    variant: ShaderVariant,
    header: String,
}

impl Program {
    fn new(variant: ShaderVariant) -> Self {
        let header = variant.generate_header();
        Self {
            id: ProgramId::next(),
            variant,
            header,
        }
    }

    /// Program identifier
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Variant the program was selected for
    pub fn variant(&self) -> &ShaderVariant {
        &self.variant
    }

    /// Preprocessor header the backend prepends to the pass sources
    pub fn header(&self) -> &str {
        &self.header
    }
}

/// Programs of one pass, keyed by variant
///
/// Selection happens through shared `Arc<Pass>` references, hence the lock.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: RwLock<HashMap<ShaderVariant, Arc<Program>>>,
}

impl ProgramCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the program for a variant, creating it on first use
    pub fn get_or_create(&self, variant: ShaderVariant) -> Arc<Program> {
        if let Some(program) = self.programs.read().get(&variant) {
            return Arc::clone(program);
        }

        let mut programs = self.programs.write();
        Arc::clone(programs.entry(variant).or_insert_with_key(|variant| {
            log::debug!(
                "New program for '{}' [{}]",
                variant.name,
                variant.summary()
            );
            Arc::new(Program::new(variant.clone()))
        }))
    }

    /// Check if a variant has a program
    pub fn contains(&self, variant: &ShaderVariant) -> bool {
        self.programs.read().contains_key(variant)
    }

    /// Number of cached programs
    pub fn count(&self) -> usize {
        self.programs.read().len()
    }

    /// Drop every cached program
    pub fn clear(&self) {
        self.programs.write().clear();
    }
}
