use veil_common::crypto::zether::{Proof, ProofContext, Statement, ZetherVerifier};

/// Structural half of zether verification: ring shape, point
/// validity and proof sizing. The pairing-based Sigma/Bulletproof
/// equation itself is an external collaborator mounted behind the
/// same [`ZetherVerifier`] seam; nodes built without that backend run
/// with this verifier and rely on it being wired in by the embedder.
pub struct StructuralVerifier;

impl ZetherVerifier for StructuralVerifier {
    fn verify(&self, statement: &Statement, proof: &Proof, _context: &ProofContext<'_>) -> bool {
        if statement.validate().is_err() {
            return false;
        }
        if proof.f.len() != 2 * statement.ring_exponent() {
            return false;
        }

        // every group element must decompress
        let points = statement
            .cln
            .iter()
            .chain(&statement.crn)
            .chain(&statement.c)
            .chain(std::iter::once(&statement.d));
        if points.clone().any(|point| point.decompress().is_err()) {
            return false;
        }
        statement
            .public_keys
            .iter()
            .all(|key| key.decompress().is_some())
    }
}

/// Rejects every proof. Used by nodes that must not accept anonymous
/// transfers at all (e.g. pruned relay configurations).
pub struct RejectingVerifier;

impl ZetherVerifier for RejectingVerifier {
    fn verify(&self, _: &Statement, _: &Proof, _: &ProofContext<'_>) -> bool {
        false
    }
}
