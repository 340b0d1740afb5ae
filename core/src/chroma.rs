//! Chromatic-adaptation coordination between white-balance and
//! color-calibration (spec.md §4.8, C8). Process-scoped per the source, but
//! *pipeline*-scoped in this port (spec.md §9 "process-wide state ->
//! pipeline-scoped state") so concurrent pipelines hold independent
//! coordinators.

/// Which piece (if any) currently holds the chromatic-adaptation-transform
/// claim, identified by its iop-order and instance index so the "earlier in
/// pipe" rule (spec.md §4.8) can be evaluated without borrowing the piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatClaim {
    pub piece_id: usize,
    pub iop_order: f32,
    pub instance: u32,
}

/// `{wb_coeffs[4], as_shot[4], D65_coeffs[4], adaptation_piece, late_correction}`
/// (spec.md §3 "Chroma state").
#[derive(Debug, Clone)]
pub struct ChromaCoordinator {
    pub wb_coeffs: [f32; 4],
    pub as_shot: [f32; 4],
    pub d65_coeffs: [f32; 4],
    claim: Option<CatClaim>,
    pub late_correction: bool,
}

impl Default for ChromaCoordinator {
    fn default() -> Self {
        ChromaCoordinator {
            wb_coeffs: [1.0; 4],
            as_shot: [1.0; 4],
            d65_coeffs: [1.0; 4],
            claim: None,
            late_correction: false,
        }
    }
}

impl ChromaCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets per-render negotiation state (claim and late-correction flag)
    /// while keeping published coefficients, mirroring how `commit_params`
    /// re-runs at the start of every render that has dirty parameters.
    pub fn reset_claim(&mut self) {
        self.claim = None;
    }

    /// A candidate CAT-capable piece claims the transform. Granted if no
    /// previous claim exists, or the claimant is earlier in the pipe: lower
    /// iop-order, ties broken by lower instance index (spec.md §9 Open
    /// Questions #2 — resolved here consistently with the §4.5 tie-break).
    ///
    /// Returns `true` if the claim was granted.
    pub fn claim_cat(&mut self, candidate: CatClaim) -> bool {
        let grant = match self.claim {
            None => true,
            Some(incumbent) => {
                candidate.iop_order < incumbent.iop_order
                    || (candidate.iop_order == incumbent.iop_order
                        && candidate.instance < incumbent.instance)
            }
        };
        if grant {
            self.claim = Some(candidate);
        }
        grant
    }

    pub fn current_claim(&self) -> Option<CatClaim> {
        self.claim
    }

    pub fn holds_claim(&self, piece_id: usize) -> bool {
        self.claim.map(|c| c.piece_id == piece_id).unwrap_or(false)
    }

    /// Published by the white-balance piece at `commit_params`.
    pub fn publish_wb(&mut self, wb_coeffs: [f32; 4], as_shot: [f32; 4], d65_coeffs: [f32; 4], late_correction: bool) {
        self.wb_coeffs = wb_coeffs;
        self.as_shot = as_shot;
        self.d65_coeffs = d65_coeffs;
        self.late_correction = late_correction;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_iop_order_wins() {
        let mut coord = ChromaCoordinator::new();
        assert!(coord.claim_cat(CatClaim {
            piece_id: 1,
            iop_order: 10.0,
            instance: 0
        }));
        // A later piece cannot steal the claim.
        assert!(!coord.claim_cat(CatClaim {
            piece_id: 2,
            iop_order: 20.0,
            instance: 0
        }));
        // An earlier piece can.
        assert!(coord.claim_cat(CatClaim {
            piece_id: 3,
            iop_order: 5.0,
            instance: 0
        }));
        assert_eq!(coord.current_claim().unwrap().piece_id, 3);
    }

    #[test]
    fn ties_break_on_instance_index() {
        let mut coord = ChromaCoordinator::new();
        assert!(coord.claim_cat(CatClaim {
            piece_id: 1,
            iop_order: 10.0,
            instance: 2
        }));
        assert!(coord.claim_cat(CatClaim {
            piece_id: 2,
            iop_order: 10.0,
            instance: 1
        }));
        assert_eq!(coord.current_claim().unwrap().instance, 1);
    }

    #[test]
    fn at_most_one_claim_after_reset() {
        let mut coord = ChromaCoordinator::new();
        coord.claim_cat(CatClaim {
            piece_id: 1,
            iop_order: 1.0,
            instance: 0,
        });
        coord.reset_claim();
        assert!(coord.current_claim().is_none());
    }
}
