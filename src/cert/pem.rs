//! PEM encoding of certificate material for the SDS wire format.
//!
//! Envoy expects inline PEM bytes: one `CERTIFICATE` block per chain entry and
//! a single private key block labelled by algorithm. Output is deterministic
//! for a given [`Certificate`].

use super::{Certificate, PrivateKey};
use pem_rfc7468::LineEnding;
use zeroize::Zeroizing;

/// PEM label of an X.509 certificate block.
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
/// PEM label of a PKCS#1 RSA private key block.
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
/// PEM label of a SEC1 EC private key block.
pub const EC_PRIVATE_KEY_LABEL: &str = "EC PRIVATE KEY";

/// An error that may arise encoding certificate material as PEM.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum EncodeError {
    /// The private key algorithm has no PEM representation Envoy accepts.
    #[error("unsupported private key type: {algorithm}")]
    UnsupportedKeyType {
        /// Algorithm of the rejected key.
        algorithm: String,
    },

    /// The PEM encoder rejected the input.
    #[error("failed encoding {label} PEM block")]
    Pem {
        /// Label of the block being encoded.
        label: &'static str,
        /// Underlying encoder error.
        #[source]
        source: pem_rfc7468::Error,
    },
}

/// Encodes the certificate chain as concatenated `CERTIFICATE` blocks, leaf first.
///
/// # Errors
///
/// Returns [`EncodeError::Pem`] if the PEM encoder fails.
pub fn encode_public(cert: &Certificate) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for der in cert.chain() {
        write_block(&mut out, CERTIFICATE_LABEL, der.as_ref())?;
    }
    Ok(out)
}

/// Encodes the private key as a single PEM block.
///
/// RSA keys are written as `RSA PRIVATE KEY` (PKCS#1), ECDSA keys as
/// `EC PRIVATE KEY` (SEC1).
///
/// # Errors
///
/// Returns [`EncodeError::UnsupportedKeyType`] for any other key.
pub fn encode_private(cert: &Certificate) -> Result<Zeroizing<Vec<u8>>, EncodeError> {
    let (label, der) = match cert.private_key() {
        PrivateKey::Rsa(der) => (RSA_PRIVATE_KEY_LABEL, der),
        PrivateKey::Ecdsa(der) => (EC_PRIVATE_KEY_LABEL, der),
        PrivateKey::Unsupported { algorithm } => {
            return Err(EncodeError::UnsupportedKeyType {
                algorithm: algorithm.clone(),
            })
        }
    };

    let mut out = Zeroizing::new(Vec::new());
    write_block(&mut out, label, der)?;
    Ok(out)
}

fn write_block(out: &mut Vec<u8>, label: &'static str, der: &[u8]) -> Result<(), EncodeError> {
    let block = pem_rfc7468::encode_string(label, LineEnding::LF, der)
        .map(Zeroizing::new)
        .map_err(|source| EncodeError::Pem { label, source })?;

    out.extend_from_slice(block.as_bytes());
    if !block.ends_with('\n') {
        out.push(b'\n');
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pem_der, EC_CERT_PEM, EC_KEY_PEM, RSA_CERT_PEM, RSA_KEY_PEM};
    use rustls_pki_types::CertificateDer;

    fn certificate(chain: &[&[u8]], key: PrivateKey) -> Certificate {
        let chain = chain
            .iter()
            .map(|der| CertificateDer::from(der.to_vec()))
            .collect();
        Certificate::new(chain, key).unwrap()
    }

    fn labels(pem: &[u8]) -> Vec<String> {
        std::str::from_utf8(pem)
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("-----BEGIN "))
            .map(|rest| rest.trim_end_matches("-----").to_owned())
            .collect()
    }

    #[test]
    fn public_has_one_block_per_chain_entry() {
        let cert = certificate(&[b"leaf", b"intermediate"], PrivateKey::rsa_pkcs1(vec![1]));

        let pem = encode_public(&cert).unwrap();

        assert_eq!(labels(&pem), vec!["CERTIFICATE", "CERTIFICATE"]);
        let text = String::from_utf8(pem).unwrap();
        let blocks: Vec<&str> = text
            .split_inclusive("-----END CERTIFICATE-----\n")
            .collect();
        assert_eq!(blocks.len(), 2);
        let (_, leaf) = pem_rfc7468::decode_vec(blocks[0].as_bytes()).unwrap();
        let (_, intermediate) = pem_rfc7468::decode_vec(blocks[1].as_bytes()).unwrap();
        assert_eq!(leaf, b"leaf");
        assert_eq!(intermediate, b"intermediate");
    }

    #[test]
    fn rsa_key_uses_pkcs1_label() {
        let cert = certificate(&[b"leaf"], PrivateKey::rsa_pkcs1(vec![0x30, 0x01, 0x00]));

        let pem = encode_private(&cert).unwrap();

        assert_eq!(labels(&pem), vec!["RSA PRIVATE KEY"]);
        let (label, der) = pem_rfc7468::decode_vec(&pem).unwrap();
        assert_eq!(label, RSA_PRIVATE_KEY_LABEL);
        assert_eq!(der, vec![0x30, 0x01, 0x00]);
    }

    #[test]
    fn ecdsa_key_uses_sec1_label() {
        let cert = certificate(&[b"leaf"], PrivateKey::ecdsa_sec1(vec![0x30, 0x00]));

        let pem = encode_private(&cert).unwrap();

        assert_eq!(labels(&pem), vec!["EC PRIVATE KEY"]);
    }

    #[test]
    fn pkcs1_rsa_entry_round_trips_through_encoder() {
        let cert = Certificate::from_pem(format!("{RSA_KEY_PEM}{RSA_CERT_PEM}").as_bytes()).unwrap();

        let pem = encode_private(&cert).unwrap();

        let (label, der) = pem_rfc7468::decode_vec(&pem).unwrap();
        assert_eq!(label, RSA_PRIVATE_KEY_LABEL);
        assert_eq!(der, pem_der(RSA_KEY_PEM));
        let public = encode_public(&cert).unwrap();
        let (label, der) = pem_rfc7468::decode_vec(&public).unwrap();
        assert_eq!(label, CERTIFICATE_LABEL);
        assert_eq!(der, pem_der(RSA_CERT_PEM));
    }

    #[test]
    fn sec1_ec_entry_round_trips_through_encoder() {
        let cert = Certificate::from_pem(format!("{EC_KEY_PEM}{EC_CERT_PEM}").as_bytes()).unwrap();

        let pem = encode_private(&cert).unwrap();

        let (label, der) = pem_rfc7468::decode_vec(&pem).unwrap();
        assert_eq!(label, EC_PRIVATE_KEY_LABEL);
        assert_eq!(der, pem_der(EC_KEY_PEM));
    }

    #[test]
    fn unsupported_key_is_rejected() {
        let cert = certificate(&[b"leaf"], PrivateKey::unsupported("Ed25519"));

        let err = encode_private(&cert).unwrap_err();

        assert_eq!(
            err,
            EncodeError::UnsupportedKeyType {
                algorithm: "Ed25519".to_owned()
            }
        );
        assert_eq!(err.to_string(), "unsupported private key type: Ed25519");
    }

    #[test]
    fn encoding_is_deterministic_and_newline_terminated() {
        let cert = certificate(&[b"leaf"], PrivateKey::ecdsa_sec1(vec![7; 121]));

        let public = encode_public(&cert).unwrap();
        let private = encode_private(&cert).unwrap();

        assert_eq!(public, encode_public(&cert).unwrap());
        assert_eq!(*private, *encode_private(&cert).unwrap());
        assert_eq!(public.last(), Some(&b'\n'));
        assert_eq!(private.last(), Some(&b'\n'));
    }
}
