// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

/// A decoded position/time sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Latitude in degrees, negative south.
    pub latitude: f64,
    /// Longitude in degrees, negative west.
    pub longitude: f64,
    /// Raw date in DDMMYY form.
    pub date: u32,
    /// Raw time in HHMMSSCC form.
    pub time: u32,
    /// False until the receiver reports a usable location.
    pub valid: bool,
}

/// Holds the most recently decoded fix.
///
/// Starts empty and invalid. Updates replace the whole fix; readers get a
/// copy so a report is never built from a half-written sample.
#[derive(Debug, Default)]
pub struct FixStore {
    fix: Fix,
}

impl FixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, fix: Fix) {
        self.fix = fix;
    }

    pub fn snapshot(&self) -> Fix {
        self.fix
    }

    /// True once any valid fix has been stored.
    pub fn has_fix(&self) -> bool {
        self.fix.valid
    }
}
