//! Payout address validation and scriptPubKey derivation.
//!
//! Accepts bech32 v0 (P2WPKH/P2WSH) mainnet addresses, the only form §4.2
//! builds a witness commitment and payout output against. `bitcoin::Address`
//! already implements BIP-173 decoding and checksum verification; this
//! module just narrows it to the witness-v0 subset the coinbase builder
//! requires and gives a typed error the rest of the pipeline can match on.

use bitcoin::{Address, Network, address::NetworkUnchecked};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address does not parse: {0}")]
    Unparseable(String),
    #[error("address is not valid on {network:?}")]
    WrongNetwork { network: Network },
    #[error("address is not a witness v0 (bech32) address")]
    NotWitnessV0,
}

/// Parse a payout address and return its scriptPubKey, requiring a witness
/// v0 program (P2WPKH or P2WSH) on the given network.
pub fn payout_script_pubkey(
    address: &str,
    network: Network,
) -> Result<bitcoin::ScriptBuf, AddressError> {
    let unchecked: Address<NetworkUnchecked> = address
        .parse()
        .map_err(|_| AddressError::Unparseable(address.to_string()))?;
    let checked = unchecked
        .require_network(network)
        .map_err(|_| AddressError::WrongNetwork { network })?;

    if !checked.is_witness_program() || checked.witness_version() != Some(bitcoin::WitnessVersion::V0)
    {
        return Err(AddressError::NotWitnessV0);
    }

    Ok(checked.script_pubkey())
}

/// Loose acceptance check used for `mining.authorize`: the username's
/// address prefix must merely look like a bech32 or base58check address, not
/// necessarily a payout-eligible one. Strict validation of the pool's own
/// payout address happens once at startup via `payout_script_pubkey`.
pub fn looks_like_address(candidate: &str) -> bool {
    if candidate.len() < 26 || candidate.len() > 90 {
        return false;
    }
    candidate.starts_with("bc1")
        || candidate.starts_with("tb1")
        || candidate.starts_with("bcrt1")
        || candidate.starts_with('1')
        || candidate.starts_with('3')
        || candidate.starts_with('m')
        || candidate.starts_with('n')
        || candidate.starts_with('2')
}

#[cfg(test)]
mod tests {
    use super::*;

    const P2WPKH_MAINNET: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    #[test]
    fn decodes_known_p2wpkh_vector() {
        let script = payout_script_pubkey(P2WPKH_MAINNET, Network::Bitcoin).unwrap();
        assert!(script.is_p2wpkh());
    }

    #[test]
    fn rejects_bad_checksum() {
        let mangled = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3x";
        assert!(payout_script_pubkey(mangled, Network::Bitcoin).is_err());
    }

    #[test]
    fn rejects_wrong_network() {
        let testnet = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        assert!(matches!(
            payout_script_pubkey(testnet, Network::Bitcoin),
            Err(AddressError::WrongNetwork { .. })
        ));
    }

    #[test]
    fn loose_check_accepts_common_prefixes() {
        assert!(looks_like_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
        assert!(looks_like_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(!looks_like_address("short"));
    }
}
