//! Two-tier section collapse state.
//!
//! `persisted` mirrors the section_state rows; `view` is what actually
//! renders and may temporarily diverge. An individual toggle writes through
//! to both tiers and the store. Collapse-all touches only the view, so
//! reloading the course restores the remembered layout. Expand-all is a
//! hard reset: both tiers cleared and the store rows deleted.

use std::collections::HashMap;

use crate::data::Db;
use crate::error::Result;

#[derive(Debug)]
pub struct SectionStates {
    course_id: i64,
    persisted: HashMap<String, bool>,
    view: HashMap<String, bool>,
}

impl SectionStates {
    /// Load the persisted flags for a course; the view starts as a copy.
    /// Sections without a row are expanded.
    pub fn load(db: &Db, course_id: i64) -> Result<Self> {
        let persisted = db.section_collapsed_map(course_id)?;
        let view = persisted.clone();
        Ok(Self {
            course_id,
            persisted,
            view,
        })
    }

    /// Register sections discovered after load (a rescan can introduce new
    /// ones); unknown sections default to expanded.
    pub fn ensure_known<I, S>(&mut self, sections: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for section in sections {
            let section = section.into();
            let persisted = *self.persisted.entry(section.clone()).or_insert(false);
            self.view.entry(section).or_insert(persisted);
        }
    }

    pub fn is_collapsed(&self, section: &str) -> bool {
        self.view.get(section).copied().unwrap_or(false)
    }

    /// Flip one section. Always durable: the new state lands in the view,
    /// the persisted map and the store.
    pub fn toggle(&mut self, db: &Db, section: &str) -> Result<bool> {
        let current = self
            .view
            .get(section)
            .or_else(|| self.persisted.get(section))
            .copied()
            .unwrap_or(false);
        let collapsed = !current;
        self.view.insert(section.to_string(), collapsed);
        self.persisted.insert(section.to_string(), collapsed);
        db.set_section_collapsed(self.course_id, section, collapsed)?;
        Ok(collapsed)
    }

    /// Collapse every known section in the view only. Nothing is written;
    /// reloading the course reverts to the remembered layout.
    pub fn collapse_all(&mut self) {
        for collapsed in self.view.values_mut() {
            *collapsed = true;
        }
    }

    /// Expand everything and erase the course's remembered section state.
    pub fn expand_all(&mut self, db: &Db) -> Result<()> {
        db.clear_section_state(self.course_id)?;
        for collapsed in self.persisted.values_mut() {
            *collapsed = false;
        }
        for collapsed in self.view.values_mut() {
            *collapsed = false;
        }
        Ok(())
    }
}
