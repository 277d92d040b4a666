//! Algorithm registry.
//!
//! Every table here is a `static` built at compile time, so lookups need no
//! synchronisation and can never observe a partially registered algorithm.
//! Names are matched case-insensitively; object identifiers map back to a
//! single canonical name.

pub mod oids;

mod cipher;
mod digest;
mod kdf;
mod signature;

pub use self::{
    cipher::{
        CipherFamily, ContentEncryption, ContentEncryptionAlgorithm, ContentParameters,
        KeyWrapAlgorithm,
    },
    digest::DigestAlgorithm,
    kdf::{KeyAgreementAlgorithm, KeyAgreementScheme, Pbkdf2Parameters, Pbkdf2Prf},
    signature::{
        default_digest_for_signature, KeyTransportAlgorithm, PssParameters, SignatureAlgorithm,
    },
};

use const_oid::ObjectIdentifier;
use der::{asn1::Any, Choice, DecodeValue, EncodeValue, Tagged};

use crate::errors::{Error, Result};

/// `AlgorithmIdentifier ::= SEQUENCE { algorithm OID, parameters ANY OPTIONAL }`
pub type AlgorithmIdentifier = spki::AlgorithmIdentifierOwned;

/// Identifier with absent parameters.
pub fn identifier(oid: ObjectIdentifier) -> AlgorithmIdentifier {
    AlgorithmIdentifier {
        oid,
        parameters: None,
    }
}

/// Identifier with `NULL` parameters.
pub fn null_identifier(oid: ObjectIdentifier) -> AlgorithmIdentifier {
    AlgorithmIdentifier {
        oid,
        parameters: Some(Any::null()),
    }
}

/// Identifier with `parameters` encoded in place.
pub fn identifier_with(
    oid: ObjectIdentifier,
    parameters: &(impl Tagged + EncodeValue),
) -> Result<AlgorithmIdentifier> {
    Ok(AlgorithmIdentifier {
        oid,
        parameters: Some(Any::encode_from(parameters)?),
    })
}

/// `true` when parameters are absent or `NULL`.
pub fn has_null_or_absent_parameters(id: &AlgorithmIdentifier) -> bool {
    id.parameters.as_ref().map_or(true, Any::is_null)
}

/// Registered name of `id`, falling back to the dotted form.
pub fn algorithm_name(id: &AlgorithmIdentifier) -> String {
    name_for_oid(&id.oid)
        .map(str::to_owned)
        .unwrap_or_else(|| id.oid.to_string())
}

/// Decodes the parameters of `id` as `T`; `what` names them in the error
/// when they are missing or do not decode.
pub(crate) fn parameters<'a, T>(id: &'a AlgorithmIdentifier, what: &'static str) -> Result<T>
where
    T: Choice<'a> + DecodeValue<'a>,
{
    id.parameters
        .as_ref()
        .ok_or(Error::Malformed(what))?
        .decode_as()
        .map_err(|_| Error::Malformed(what))
}

/// What an algorithm's `parameters` field must hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterRule {
    /// Must be omitted.
    Absent,
    /// `NULL` or omitted.
    NullOrAbsent,
    /// Must be present.
    Required,
    /// Not constrained by the registry.
    Any,
}

/// Parameter rule registered for `oid`.
pub fn parameter_rule(oid: &ObjectIdentifier) -> ParameterRule {
    PARAMETER_RULES
        .iter()
        .find(|(o, _)| o == oid)
        .map_or(ParameterRule::Any, |(_, rule)| *rule)
}

/// Validates `id.parameters` against [`parameter_rule`].
pub fn check_parameters(id: &AlgorithmIdentifier) -> Result<()> {
    let ok = match parameter_rule(&id.oid) {
        ParameterRule::Absent => id.parameters.is_none(),
        ParameterRule::NullOrAbsent => has_null_or_absent_parameters(id),
        ParameterRule::Required => id.parameters.is_some(),
        ParameterRule::Any => true,
    };
    if !ok {
        return Err(Error::Malformed("algorithm parameters violate registry rule"));
    }
    Ok(())
}

static PARAMETER_RULES: &[(ObjectIdentifier, ParameterRule)] = &[
    (oids::SHA1, ParameterRule::NullOrAbsent),
    (oids::SHA224, ParameterRule::NullOrAbsent),
    (oids::SHA256, ParameterRule::NullOrAbsent),
    (oids::SHA384, ParameterRule::NullOrAbsent),
    (oids::SHA512, ParameterRule::NullOrAbsent),
    (oids::SHA512_224, ParameterRule::NullOrAbsent),
    (oids::SHA512_256, ParameterRule::NullOrAbsent),
    (oids::SHA3_224, ParameterRule::NullOrAbsent),
    (oids::SHA3_256, ParameterRule::NullOrAbsent),
    (oids::SHA3_384, ParameterRule::NullOrAbsent),
    (oids::SHA3_512, ParameterRule::NullOrAbsent),
    (oids::RSA_ENCRYPTION, ParameterRule::NullOrAbsent),
    (oids::SHA1_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA224_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA256_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA384_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA512_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA512_224_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA512_256_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA3_224_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA3_256_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA3_384_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::SHA3_512_WITH_RSA, ParameterRule::NullOrAbsent),
    (oids::RSASSA_PSS, ParameterRule::Required),
    (oids::RSAES_OAEP, ParameterRule::Required),
    (oids::ECDSA_WITH_SHA1, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA224, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA256, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA384, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA512, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA3_224, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA3_256, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA3_384, ParameterRule::Absent),
    (oids::ECDSA_WITH_SHA3_512, ParameterRule::Absent),
    (oids::DSA_WITH_SHA1, ParameterRule::Absent),
    (oids::DSA_WITH_SHA224, ParameterRule::Absent),
    (oids::DSA_WITH_SHA256, ParameterRule::Absent),
    (oids::AES128_WRAP, ParameterRule::Absent),
    (oids::AES192_WRAP, ParameterRule::Absent),
    (oids::AES256_WRAP, ParameterRule::Absent),
    (oids::CAMELLIA128_WRAP, ParameterRule::Absent),
    (oids::CAMELLIA192_WRAP, ParameterRule::Absent),
    (oids::CAMELLIA256_WRAP, ParameterRule::Absent),
    (oids::DES_EDE3_WRAP, ParameterRule::NullOrAbsent),
    (oids::DES_EDE3_CBC, ParameterRule::Required),
    (oids::RC2_CBC, ParameterRule::Required),
    (oids::AES128_CBC, ParameterRule::Required),
    (oids::AES192_CBC, ParameterRule::Required),
    (oids::AES256_CBC, ParameterRule::Required),
    (oids::AES128_GCM, ParameterRule::Required),
    (oids::AES192_GCM, ParameterRule::Required),
    (oids::AES256_GCM, ParameterRule::Required),
    (oids::AES128_CCM, ParameterRule::Required),
    (oids::AES192_CCM, ParameterRule::Required),
    (oids::AES256_CCM, ParameterRule::Required),
    (oids::CAMELLIA128_CBC, ParameterRule::Required),
    (oids::CAMELLIA192_CBC, ParameterRule::Required),
    (oids::CAMELLIA256_CBC, ParameterRule::Required),
    (oids::PBKDF2, ParameterRule::Required),
    (oids::PWRI_KEK, ParameterRule::Required),
    (oids::ECDH_STD_SHA1KDF, ParameterRule::Required),
    (oids::ECDH_STD_SHA224KDF, ParameterRule::Required),
    (oids::ECDH_STD_SHA256KDF, ParameterRule::Required),
    (oids::ECDH_STD_SHA384KDF, ParameterRule::Required),
    (oids::ECDH_STD_SHA512KDF, ParameterRule::Required),
    (oids::ECDH_COFACTOR_SHA1KDF, ParameterRule::Required),
    (oids::ECDH_COFACTOR_SHA224KDF, ParameterRule::Required),
    (oids::ECDH_COFACTOR_SHA256KDF, ParameterRule::Required),
    (oids::ECDH_COFACTOR_SHA384KDF, ParameterRule::Required),
    (oids::ECDH_COFACTOR_SHA512KDF, ParameterRule::Required),
    (oids::ECMQV_SHA1KDF, ParameterRule::Required),
    (oids::ECMQV_SHA224KDF, ParameterRule::Required),
    (oids::ECMQV_SHA256KDF, ParameterRule::Required),
    (oids::ECMQV_SHA384KDF, ParameterRule::Required),
    (oids::ECMQV_SHA512KDF, ParameterRule::Required),
];

/// Canonical name for every registered identifier. Lookups by name scan
/// this table case-insensitively, so aliases map to the same entry.
static NAMES: &[(&str, ObjectIdentifier)] = &[
    ("SHA1", oids::SHA1),
    ("SHA224", oids::SHA224),
    ("SHA256", oids::SHA256),
    ("SHA384", oids::SHA384),
    ("SHA512", oids::SHA512),
    ("SHA512(224)", oids::SHA512_224),
    ("SHA512(256)", oids::SHA512_256),
    ("SHA3-224", oids::SHA3_224),
    ("SHA3-256", oids::SHA3_256),
    ("SHA3-384", oids::SHA3_384),
    ("SHA3-512", oids::SHA3_512),
    ("RSA", oids::RSA_ENCRYPTION),
    ("RSAOAEP", oids::RSAES_OAEP),
    ("RSAANDMGF1", oids::RSASSA_PSS),
    ("SHA1WITHRSA", oids::SHA1_WITH_RSA),
    ("SHA224WITHRSA", oids::SHA224_WITH_RSA),
    ("SHA256WITHRSA", oids::SHA256_WITH_RSA),
    ("SHA384WITHRSA", oids::SHA384_WITH_RSA),
    ("SHA512WITHRSA", oids::SHA512_WITH_RSA),
    ("SHA512(224)WITHRSA", oids::SHA512_224_WITH_RSA),
    ("SHA512(256)WITHRSA", oids::SHA512_256_WITH_RSA),
    ("SHA3-224WITHRSA", oids::SHA3_224_WITH_RSA),
    ("SHA3-256WITHRSA", oids::SHA3_256_WITH_RSA),
    ("SHA3-384WITHRSA", oids::SHA3_384_WITH_RSA),
    ("SHA3-512WITHRSA", oids::SHA3_512_WITH_RSA),
    ("EC", oids::EC_PUBLIC_KEY),
    ("SHA1WITHECDSA", oids::ECDSA_WITH_SHA1),
    ("SHA224WITHECDSA", oids::ECDSA_WITH_SHA224),
    ("SHA256WITHECDSA", oids::ECDSA_WITH_SHA256),
    ("SHA384WITHECDSA", oids::ECDSA_WITH_SHA384),
    ("SHA512WITHECDSA", oids::ECDSA_WITH_SHA512),
    ("SHA3-224WITHECDSA", oids::ECDSA_WITH_SHA3_224),
    ("SHA3-256WITHECDSA", oids::ECDSA_WITH_SHA3_256),
    ("SHA3-384WITHECDSA", oids::ECDSA_WITH_SHA3_384),
    ("SHA3-512WITHECDSA", oids::ECDSA_WITH_SHA3_512),
    ("DSA", oids::DSA),
    ("SHA1WITHDSA", oids::DSA_WITH_SHA1),
    ("SHA224WITHDSA", oids::DSA_WITH_SHA224),
    ("SHA256WITHDSA", oids::DSA_WITH_SHA256),
    ("DESEDE3CBC", oids::DES_EDE3_CBC),
    ("RC2CBC", oids::RC2_CBC),
    ("AES128CBC", oids::AES128_CBC),
    ("AES192CBC", oids::AES192_CBC),
    ("AES256CBC", oids::AES256_CBC),
    ("AES128GCM", oids::AES128_GCM),
    ("AES192GCM", oids::AES192_GCM),
    ("AES256GCM", oids::AES256_GCM),
    ("AES128CCM", oids::AES128_CCM),
    ("AES192CCM", oids::AES192_CCM),
    ("AES256CCM", oids::AES256_CCM),
    ("CAMELLIA128CBC", oids::CAMELLIA128_CBC),
    ("CAMELLIA192CBC", oids::CAMELLIA192_CBC),
    ("CAMELLIA256CBC", oids::CAMELLIA256_CBC),
    ("SEEDCBC", oids::SEED_CBC),
    ("AES128WRAP", oids::AES128_WRAP),
    ("AES192WRAP", oids::AES192_WRAP),
    ("AES256WRAP", oids::AES256_WRAP),
    ("DESEDE3WRAP", oids::DES_EDE3_WRAP),
    ("CAMELLIA128WRAP", oids::CAMELLIA128_WRAP),
    ("CAMELLIA192WRAP", oids::CAMELLIA192_WRAP),
    ("CAMELLIA256WRAP", oids::CAMELLIA256_WRAP),
    ("SEEDWRAP", oids::SEED_WRAP),
    ("PBKDF2", oids::PBKDF2),
    ("PWRIKEK", oids::PWRI_KEK),
    ("ECDHSHA1KDF", oids::ECDH_STD_SHA1KDF),
    ("ECDHSHA224KDF", oids::ECDH_STD_SHA224KDF),
    ("ECDHSHA256KDF", oids::ECDH_STD_SHA256KDF),
    ("ECDHSHA384KDF", oids::ECDH_STD_SHA384KDF),
    ("ECDHSHA512KDF", oids::ECDH_STD_SHA512KDF),
    ("ECCDHSHA1KDF", oids::ECDH_COFACTOR_SHA1KDF),
    ("ECCDHSHA224KDF", oids::ECDH_COFACTOR_SHA224KDF),
    ("ECCDHSHA256KDF", oids::ECDH_COFACTOR_SHA256KDF),
    ("ECCDHSHA384KDF", oids::ECDH_COFACTOR_SHA384KDF),
    ("ECCDHSHA512KDF", oids::ECDH_COFACTOR_SHA512KDF),
    ("ECMQVSHA1KDF", oids::ECMQV_SHA1KDF),
    ("ECMQVSHA224KDF", oids::ECMQV_SHA224KDF),
    ("ECMQVSHA256KDF", oids::ECMQV_SHA256KDF),
    ("ECMQVSHA384KDF", oids::ECMQV_SHA384KDF),
    ("ECMQVSHA512KDF", oids::ECMQV_SHA512KDF),
];

/// Aliases accepted by [`oid_for_name`] in addition to canonical names.
static ALIASES: &[(&str, ObjectIdentifier)] = &[
    ("SHA-1", oids::SHA1),
    ("SHA-224", oids::SHA224),
    ("SHA-256", oids::SHA256),
    ("SHA-384", oids::SHA384),
    ("SHA-512", oids::SHA512),
    ("SHA256WITHRSAANDMGF1", oids::RSASSA_PSS),
    ("SHA384WITHRSAANDMGF1", oids::RSASSA_PSS),
    ("SHA512WITHRSAANDMGF1", oids::RSASSA_PSS),
    ("SHA256WITHRSA/PSS", oids::RSASSA_PSS),
    ("AES-128-CBC", oids::AES128_CBC),
    ("AES-192-CBC", oids::AES192_CBC),
    ("AES-256-CBC", oids::AES256_CBC),
    ("DES-EDE3-CBC", oids::DES_EDE3_CBC),
];

/// Looks up an identifier by name, ignoring ASCII case.
pub fn oid_for_name(name: &str) -> Result<ObjectIdentifier> {
    NAMES
        .iter()
        .chain(ALIASES)
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, oid)| *oid)
        .ok_or_else(|| Error::UnknownAlgorithmName(name.to_owned()))
}

/// Canonical name of a registered identifier.
pub fn name_for_oid(oid: &ObjectIdentifier) -> Option<&'static str> {
    NAMES.iter().find(|(_, o)| o == oid).map(|(n, _)| *n)
}

/// Resolves a signature algorithm name such as `SHA256WITHRSA`,
/// `SHA384WITHECDSA` or `SHA256WITHRSAANDMGF1`.
pub fn signature_algorithm_for_name(name: &str) -> Result<SignatureAlgorithm> {
    let upper = name.to_ascii_uppercase();
    if let Some(hash) = upper.strip_suffix("WITHRSAANDMGF1") {
        let digest = DigestAlgorithm::from_oid(&oid_for_name(hash)?)?;
        return Ok(SignatureAlgorithm::RsaPss(PssParameters::new(digest)));
    }
    let oid = oid_for_name(name)?;
    if oid == oids::RSASSA_PSS {
        return Ok(SignatureAlgorithm::RsaPss(PssParameters::new(DigestAlgorithm::Sha256)));
    }
    SignatureAlgorithm::from_identifier(&null_identifier(oid))
        .or_else(|_| SignatureAlgorithm::from_identifier(&identifier(oid)))
}
