//! Which parameters are shared across the networks of a collection.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Free/shared flags consumed uniformly by the fitter.
///
/// | name      | density | row mixture | col mixture |
/// |-----------|---------|-------------|-------------|
/// | `iid`     | shared  | shared      | shared      |
/// | `pi`      | shared  | free        | shared      |
/// | `rho`     | shared  | shared      | free        |
/// | `pirho`   | shared  | free        | free        |
/// | `delta`   | free    | shared      | shared      |
/// | `deltapi` | free    | free        | shared      |
///
/// A free density scales the shared connectivity by a per-network
/// factor, `α^m = δ_m α` with `δ` of the first network fixed to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelVariant {
    pub free_density: bool,
    pub free_mixture_row: bool,
    pub free_mixture_col: bool,
}

impl ModelVariant {
    pub const IID: ModelVariant = ModelVariant {
        free_density: false,
        free_mixture_row: false,
        free_mixture_col: false,
    };

    /// Number of free connectivity parameters for `(q1, q2)` blocks over
    /// `num_networks` networks. `symmetric` applies to unipartite
    /// collections where every network is undirected.
    pub fn num_connectivity_params(
        &self,
        q: (usize, usize),
        num_networks: usize,
        symmetric: bool,
    ) -> usize {
        let alpha = if symmetric {
            q.0 * (q.0 + 1) / 2
        } else {
            q.0 * q.1
        };
        let delta = if self.free_density {
            num_networks.saturating_sub(1)
        } else {
            0
        };
        alpha + delta
    }

    /// Number of free row-mixture parameters
    pub fn num_row_mixture_params(&self, q1: usize, num_networks: usize) -> usize {
        let copies = if self.free_mixture_row { num_networks } else { 1 };
        q1.saturating_sub(1) * copies
    }

    /// Number of free column-mixture parameters (bipartite only)
    pub fn num_col_mixture_params(&self, q2: usize, num_networks: usize) -> usize {
        let copies = if self.free_mixture_col { num_networks } else { 1 };
        q2.saturating_sub(1) * copies
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (free_density, free_mixture_row, free_mixture_col) =
            match s.to_ascii_lowercase().as_str() {
                "iid" => (false, false, false),
                "pi" => (false, true, false),
                "rho" => (false, false, true),
                "pirho" => (false, true, true),
                "delta" => (true, false, false),
                "deltapi" => (true, true, false),
                _ => return Err(Error::UnknownVariant(s.to_string())),
            };
        Ok(ModelVariant {
            free_density,
            free_mixture_row,
            free_mixture_col,
        })
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut name = String::new();
        if self.free_density {
            name.push_str("delta");
        }
        if self.free_mixture_row {
            name.push_str("pi");
        }
        if self.free_mixture_col {
            name.push_str("rho");
        }
        if name.is_empty() {
            name.push_str("iid");
        }
        write!(f, "{}", name)
    }
}
