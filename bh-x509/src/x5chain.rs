// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::{PKey, Private, Public},
    stack::Stack,
    x509::{
        extension::SubjectAlternativeName, store::X509StoreBuilder, X509NameBuilder,
        X509StoreContext, X509,
    },
};
use serde::{Deserialize, Serialize};

use crate::{error::X509Error, Result};

/// An ordered X.509 certificate chain.
///
/// The first certificate is the *leaf*, i.e. the one corresponding to the key used for signing;
/// each following certificate should certify the one preceding it.  The chain **MUST NOT** be
/// empty.
#[derive(Clone, Debug, PartialEq)]
pub struct X5Chain(Vec<X509>);

impl X5Chain {
    /// Create an [`X5Chain`] from the DER encodings of its certificates, leaf first.
    pub fn from_raw_bytes(certificates: &[Vec<u8>]) -> Result<Self> {
        if certificates.is_empty() {
            return Err(bherror::Error::root(X509Error::InvalidChain).ctx("empty `x5chain`"));
        }

        let certificates = certificates
            .iter()
            .map(|der| X509::from_der(der).foreign_err(|| X509Error::InvalidCertificate))
            .collect::<Result<_>>()?;

        Ok(Self(certificates))
    }

    /// Return the DER encodings of the certificates, leaf first.
    pub fn as_bytes(&self) -> Result<Vec<Vec<u8>>> {
        self.0
            .iter()
            .map(|cert| cert.to_der().foreign_err(|| X509Error::InvalidCertificate))
            .collect()
    }

    /// Return the leaf certificate of the chain.
    pub fn leaf_certificate(&self) -> &X509 {
        // the chain is never empty
        &self.0[0]
    }

    /// Return the public key of the leaf certificate.
    pub fn leaf_certificate_key(&self) -> Result<PKey<Public>> {
        self.leaf_certificate()
            .public_key()
            .foreign_err(|| X509Error::InvalidCertificate)
            .ctx(|| "invalid leaf certificate public key")
    }

    /// Return all SAN dNSName entries of the leaf certificate.
    ///
    /// An error is returned only when the leaf carries no dNSName at all; callers enforcing the
    /// `x509_san_dns` client-identifier scheme match the returned names against the client id.
    pub fn leaf_san_dns_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .leaf_certificate()
            .subject_alt_names()
            .into_iter()
            .flatten()
            .filter_map(|general_name| general_name.dnsname().map(str::to_owned))
            .collect();

        if names.is_empty() {
            return Err(bherror::Error::root(X509Error::MissingSanDnsName));
        }

        Ok(names)
    }

    /// Generate a single-certificate chain with a fresh self-signed certificate for the provided
    /// private key.
    ///
    /// The certificate is valid for one year from the moment of creation.  When `san_dns` is
    /// provided, a SAN dNSName extension is added, as required for the `x509_san_dns` client
    /// identifier scheme.
    pub fn self_signed(
        private_key_pem: &[u8],
        common_name: &str,
        san_dns: Option<&str>,
    ) -> Result<Self> {
        let pkey: PKey<Private> = PKey::private_key_from_pem(private_key_pem)
            .foreign_err(|| X509Error::CryptoBackend)
            .ctx(|| "invalid private key PEM")?;

        let cert = build_self_signed(&pkey, common_name, san_dns)
            .foreign_err(|| X509Error::CryptoBackend)
            .ctx(|| "self-signed certificate generation failed")?;

        Ok(Self(vec![cert]))
    }
}

/// The whole self-signed construction in one place, so the openssl error handling does not have
/// to be repeated for every builder call.
fn build_self_signed(
    pkey: &PKey<Private>,
    common_name: &str,
    san_dns: Option<&str>,
) -> std::result::Result<X509, openssl::error::ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", common_name)?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(159, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(serial.to_asn1_integer()?.as_ref())?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(pkey)?;
    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(365)?.as_ref())?;

    if let Some(dns) = san_dns {
        let san = SubjectAlternativeName::new()
            .dns(dns)
            .build(&builder.x509v3_context(None, None))?;
        builder.append_extension(san)?;
    }

    builder.sign(pkey, MessageDigest::sha256())?;

    Ok(builder.build())
}

/// The `x5c` JOSE header representation of an [`X5Chain`]: an array of base64 (standard, padded)
/// DER certificate strings, as specified in [RFC 7515, section 4.1.6][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc7515#section-4.1.6>
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwtX5Chain(Vec<String>);

impl TryFrom<X5Chain> for JwtX5Chain {
    type Error = bherror::Error<X509Error>;

    fn try_from(chain: X5Chain) -> Result<Self> {
        let certificates = chain
            .as_bytes()?
            .into_iter()
            .map(|der| STANDARD.encode(der))
            .collect();

        Ok(Self(certificates))
    }
}

impl TryFrom<JwtX5Chain> for X5Chain {
    type Error = bherror::Error<X509Error>;

    fn try_from(chain: JwtX5Chain) -> Result<Self> {
        let certificates = chain
            .0
            .iter()
            .map(|b64| {
                STANDARD
                    .decode(b64)
                    .foreign_err(|| X509Error::InvalidCertificate)
                    .ctx(|| "`x5c` entry is not base64")
            })
            .collect::<Result<Vec<_>>>()?;

        X5Chain::from_raw_bytes(&certificates)
    }
}

/// A set of trusted root certificates.
///
/// A presented [`X5Chain`] is considered trusted iff its leaf verifies through the chain up to
/// one of the roots in this set.
#[derive(Debug, Clone)]
pub struct X509Trust {
    roots: Vec<X509>,
}

impl X509Trust {
    /// Create a new trust set from the provided root certificates.
    pub fn new(roots: Vec<X509>) -> Self {
        Self { roots }
    }

    /// Verify that the provided chain terminates in one of the trusted roots.
    pub fn verify(&self, chain: &X5Chain) -> Result<()> {
        let verified = verify_against_roots(&self.roots, &chain.0)
            .foreign_err(|| X509Error::CryptoBackend)
            .ctx(|| "chain verification failed to run")?;

        if !verified {
            return Err(bherror::Error::root(X509Error::UntrustedChain));
        }

        Ok(())
    }
}

fn verify_against_roots(
    roots: &[X509],
    chain: &[X509],
) -> std::result::Result<bool, openssl::error::ErrorStack> {
    let mut store = X509StoreBuilder::new()?;
    for root in roots {
        store.add_cert(root.clone())?;
    }
    let store = store.build();

    let mut untrusted = Stack::new()?;
    for cert in &chain[1..] {
        untrusted.push(cert.clone())?;
    }

    let mut context = X509StoreContext::new()?;
    context.init(&store, &chain[0], &untrusted, |c| c.verify_cert())
}

#[cfg(test)]
mod tests {
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;

    use super::*;

    fn dummy_key_pem() -> Vec<u8> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        key.private_key_to_pem().unwrap()
    }

    #[test]
    fn self_signed_chain_roundtrips_through_x5c() {
        let pem = dummy_key_pem();
        let chain = X5Chain::self_signed(&pem, "unit-test", None).unwrap();

        let jwt_chain: JwtX5Chain = chain.clone().try_into().unwrap();
        let decoded: X5Chain = jwt_chain.try_into().unwrap();

        assert_eq!(chain.as_bytes().unwrap(), decoded.as_bytes().unwrap());
    }

    #[test]
    fn empty_chain_is_rejected() {
        let err = X5Chain::from_raw_bytes(&[]).unwrap_err();
        assert_eq!(err.error, X509Error::InvalidChain);
    }

    #[test]
    fn san_dns_names_are_extracted() {
        let pem = dummy_key_pem();
        let chain = X5Chain::self_signed(&pem, "unit-test", Some("verifier.example")).unwrap();

        assert_eq!(
            chain.leaf_san_dns_names().unwrap(),
            vec!["verifier.example".to_owned()]
        );
    }

    #[test]
    fn missing_san_dns_is_an_error() {
        let pem = dummy_key_pem();
        let chain = X5Chain::self_signed(&pem, "unit-test", None).unwrap();

        let err = chain.leaf_san_dns_names().unwrap_err();
        assert_eq!(err.error, X509Error::MissingSanDnsName);
    }

    #[test]
    fn self_signed_chain_is_its_own_trust_root() {
        let pem = dummy_key_pem();
        let chain = X5Chain::self_signed(&pem, "unit-test", None).unwrap();

        let trust = X509Trust::new(vec![chain.leaf_certificate().clone()]);
        trust.verify(&chain).unwrap();

        let empty_trust = X509Trust::new(vec![]);
        let err = empty_trust.verify(&chain).unwrap_err();
        assert_eq!(err.error, X509Error::UntrustedChain);
    }
}
