use super::{check_canceled, BuilderError};
use crate::{
    crypto::{
        zether::{is_power_of_two, MAX_RING_SIZE, MIN_RING_SIZE},
        Address, CompressedPublicKey, PrivateKey,
    },
    utils::CancelToken,
};
use rand::Rng;
use std::collections::HashSet;

/// Where decoy members come from. The daemon backs this with the
/// registrations map; tests back it with a plain list.
pub trait RingMemberSource {
    fn registered_count(&self) -> u64;

    fn get_random_registered_key(&self) -> Option<CompressedPublicKey>;
}

/// Pick the anonymity set for a zether transfer: `ring_size - 2`
/// members on top of sender and destination, none duplicated.
///
/// `ring_size` of 0 picks a random power of two in [16, 128];
/// `new_accounts` of `None` picks a random share below `ring_size / 5`.
/// Fresh keys are used while the chain has fewer registered accounts
/// than the ring needs, or for the requested `new_accounts` count.
pub fn create_zether_ring<S: RingMemberSource>(
    from: &Address,
    destination: &Address,
    ring_size: usize,
    new_accounts: Option<usize>,
    source: &S,
    cancel: &CancelToken,
) -> Result<Vec<Address>, BuilderError> {
    let mut rng = rand::thread_rng();

    let ring_size = if ring_size == 0 {
        1 << rng.gen_range(4..8)
    } else {
        ring_size
    };

    if !is_power_of_two(ring_size) {
        return Err(BuilderError::RingSizeNotPowerOfTwo);
    }
    if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&ring_size) {
        return Err(BuilderError::RingSizeNotPowerOfTwo);
    }

    let new_accounts = match new_accounts {
        Some(count) => count,
        None => {
            let bound = (ring_size / 5).max(1);
            rng.gen_range(0..bound)
        }
    };
    if new_accounts > ring_size - 2 {
        return Err(BuilderError::NewAccountsOutOfRange);
    }

    let mut already_used = HashSet::new();
    already_used.insert(from.get_public_key().clone());
    already_used.insert(destination.get_public_key().clone());

    let mut members = Vec::with_capacity(ring_size - 2);
    while members.len() < ring_size - 2 {
        check_canceled(cancel)?;

        let use_fresh_key = source.registered_count() < ring_size as u64
            || members.len() < new_accounts;

        let address = if use_fresh_key {
            PrivateKey::generate().to_address(0, Vec::new())?
        } else {
            let key = source
                .get_random_registered_key()
                .ok_or(BuilderError::NoRegisteredAccount)?;
            Address::new(key, 0, Vec::new())?
        };

        // duplicates are re-drawn, never returned
        if !already_used.insert(address.get_public_key().clone()) {
            continue;
        }
        members.push(address);
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    struct Registered(Vec<CompressedPublicKey>);

    impl RingMemberSource for Registered {
        fn registered_count(&self) -> u64 {
            self.0.len() as u64
        }

        fn get_random_registered_key(&self) -> Option<CompressedPublicKey> {
            if self.0.is_empty() {
                return None;
            }
            let index = rand::thread_rng().gen_range(0..self.0.len());
            Some(self.0[index].clone())
        }
    }

    fn address() -> Address {
        KeyPair::new()
            .get_private_key()
            .to_address(0, Vec::new())
            .unwrap()
    }

    #[test]
    fn test_ring_sizes_and_uniqueness() {
        let from = address();
        let destination = address();
        let registered = Registered(
            (0..512)
                .map(|_| KeyPair::new().get_public_key().compress())
                .collect(),
        );
        let cancel = CancelToken::new();

        for p in [4usize, 5, 6, 7] {
            let ring_size = 1 << p;
            let new_accounts = ring_size / 5;

            let members = create_zether_ring(
                &from,
                &destination,
                ring_size,
                Some(new_accounts),
                &registered,
                &cancel,
            )
            .unwrap();

            assert_eq!(members.len(), ring_size - 2);

            let mut seen = HashSet::new();
            seen.insert(from.get_public_key().clone());
            seen.insert(destination.get_public_key().clone());
            for member in &members {
                assert!(seen.insert(member.get_public_key().clone()));
            }
        }
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        let from = address();
        let destination = address();
        let registered = Registered(Vec::new());
        let cancel = CancelToken::new();

        assert!(matches!(
            create_zether_ring(&from, &destination, 24, Some(0), &registered, &cancel),
            Err(BuilderError::RingSizeNotPowerOfTwo)
        ));
    }

    #[test]
    fn test_cancellation_observed() {
        let from = address();
        let destination = address();
        let registered = Registered(Vec::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            create_zether_ring(&from, &destination, 16, Some(2), &registered, &cancel),
            Err(BuilderError::Canceled)
        ));
    }
}
