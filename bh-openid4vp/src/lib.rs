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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate implements the [OpenID for Verifiable Presentations][1] (OpenID4VP) and
//! [SIOPv2][2] request-response protocol between a Verifier (Relying Party) and a Holder
//! (Wallet), over the three credential representations of the stack: W3C VC-JWT
//! ([`bh_vc_jwt`]), IETF SD-JWT VC ([`bh_sd_jwt`]) and ISO/IEC 18013-5 mdoc ([`bh_mdoc`]).
//!
//! [1]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//! [2]: <https://openid.net/specs/openid-connect-self-issued-v2-1_0.html>
//!
//! # Details
//!
//! The crate is organized around the agent roles.
//!
//! * [`Openid4VpVerifier`] -- constructs authorization requests (plain query, by reference,
//!   signed JAR by value or by reference), tracks `state` → request and single-use nonces, and
//!   drives the response-validation state machine over every presented descriptor.
//! * [`Wallet`] -- holds credentials, parses & authenticates requests, and builds the
//!   presentation response for any supported response mode, including `direct_post.jwt` with
//!   an encrypted (JWE) response.
//! * [`Issuer`] -- issues one credential subject across all three representations.
//!
//! The DIF Presentation Exchange v2 subset used for requesting credentials lives in [`pex`];
//! the single-use [`NonceService`] and the concurrent [`MapStore`] in [`store`]; the remote
//! signature-request DTOs in [`rqes`].

pub mod error;
pub mod holder;
pub mod issuer;
pub mod pex;
pub mod request;
pub mod response;
pub mod rqes;
pub mod store;
pub mod verifier;

pub use error::{OpenId4VpError, Result};
pub use holder::Wallet;
pub use issuer::{IssuedCredential, Issuer};
pub use pex::{InputDescriptor, PresentationDefinition, PresentationSubmission};
pub use request::{
    AuthenticationRequestParameters, ClientIdScheme, CreatedRequest, RelyingPartyMetadata,
    RequestMode, ResponseMode,
};
pub use response::{AuthnResponseOutcome, PresentationResult};
pub use store::{MapStore, NonceService};
pub use verifier::{AuthnResponse, Openid4VpVerifier};

/// Number of seconds since the UNIX epoch.
pub type SecondsSinceEpoch = u64;

/// A JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
