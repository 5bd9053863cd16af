//! Label code generator.
//!
//! Tokens take the form `PPP-BBB-YYYYmmddHHMMSS-XXXX`: the first three
//! characters of the product and the brand, the UTC generation time and
//! four random characters from `A-Z0-9`.  Tokens issued under the current
//! stem are remembered so rapid calls within one second can never hand out
//! the same code.  A new stem cannot collide with older tokens, so the set
//! is cleared whenever the stem changes.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::app::ports::{Clock, CodeGenerator};
use crate::error::LabelError;
use crate::production::{GeneratedCode, RunDescriptor};

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;
const MAX_ATTEMPTS: usize = 16;

/// Contents encoded into the printed label.
#[derive(Serialize)]
struct LabelPayload<'a> {
    unique_id: &'a str,
    product: &'a str,
    brand: &'a str,
    production_type: &'a str,
    production_time: String,
    box_number: u32,
    total_boxes: u32,
}

pub struct LabelCodeGenerator {
    artifact_dir: String,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    /// Stem the `issued` set belongs to.
    issued_stem: String,
    issued: HashSet<String>,
}

impl LabelCodeGenerator {
    pub fn new(artifact_dir: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(artifact_dir, clock, StdRng::from_entropy())
    }

    /// Deterministic suffixes, for reproducible tests.
    pub fn seeded(artifact_dir: impl Into<String>, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(artifact_dir, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(artifact_dir: impl Into<String>, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            clock,
            rng,
            issued_stem: String::new(),
            issued: HashSet::new(),
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| CHARSET[self.rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }

    fn unique_token(&mut self, stem: &str) -> Result<String, LabelError> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = format!("{}-{}", stem, self.suffix());
            if !self.issued.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(LabelError::Exhausted)
    }
}

/// First three characters of a label, upper-cased.
fn prefix(label: &str) -> String {
    label.trim().chars().take(3).collect::<String>().to_uppercase()
}

impl CodeGenerator for LabelCodeGenerator {
    fn generate(
        &mut self,
        descriptor: &RunDescriptor,
        ordinal: u32,
        quantity: u32,
    ) -> Result<GeneratedCode, LabelError> {
        let now = self.clock.now();
        let stem = format!(
            "{}-{}-{}",
            prefix(&descriptor.product),
            prefix(&descriptor.brand),
            now.format("%Y%m%d%H%M%S")
        );
        if stem != self.issued_stem {
            self.issued.clear();
            self.issued_stem.clone_from(&stem);
        }

        let token = self.unique_token(&stem)?;
        let payload = serde_json::to_string(&LabelPayload {
            unique_id: &token,
            product: &descriptor.product,
            brand: &descriptor.brand,
            production_type: &descriptor.production_type,
            production_time: now.to_rfc3339(),
            box_number: ordinal,
            total_boxes: quantity,
        })
        .map_err(|_| LabelError::Encoding)?;

        debug!("label code {} for box {}/{}", token, ordinal, quantity);
        self.issued.insert(token.clone());
        Ok(GeneratedCode {
            artifact: format!("{}/{}.png", self.artifact_dir, token),
            token,
            payload,
        })
    }
}
