//! Object identifiers used by CMS and the algorithms it carries.

use const_oid::ObjectIdentifier;

const fn oid(s: &str) -> ObjectIdentifier {
    ObjectIdentifier::new_unwrap(s)
}

// content types (RFC 5652 § 4-9, RFC 5083)
/// `id-data`
pub const ID_DATA: ObjectIdentifier = oid("1.2.840.113549.1.7.1");
/// `id-signedData`
pub const ID_SIGNED_DATA: ObjectIdentifier = oid("1.2.840.113549.1.7.2");
/// `id-envelopedData`
pub const ID_ENVELOPED_DATA: ObjectIdentifier = oid("1.2.840.113549.1.7.3");
/// `id-digestedData`
pub const ID_DIGESTED_DATA: ObjectIdentifier = oid("1.2.840.113549.1.7.5");
/// `id-encryptedData`
pub const ID_ENCRYPTED_DATA: ObjectIdentifier = oid("1.2.840.113549.1.7.6");
/// `id-ct-authData`
pub const ID_CT_AUTH_DATA: ObjectIdentifier = oid("1.2.840.113549.1.9.16.1.2");
/// `id-ct-authEnvelopedData`
pub const ID_CT_AUTH_ENVELOPED_DATA: ObjectIdentifier = oid("1.2.840.113549.1.9.16.1.23");

// attributes
/// `id-contentType`
pub const ID_CONTENT_TYPE: ObjectIdentifier = oid("1.2.840.113549.1.9.3");
/// `id-messageDigest`
pub const ID_MESSAGE_DIGEST: ObjectIdentifier = oid("1.2.840.113549.1.9.4");
/// `id-signingTime`
pub const ID_SIGNING_TIME: ObjectIdentifier = oid("1.2.840.113549.1.9.5");
/// `id-countersignature`
pub const ID_COUNTERSIGNATURE: ObjectIdentifier = oid("1.2.840.113549.1.9.6");

// digests
/// SHA-1
pub const SHA1: ObjectIdentifier = oid("1.3.14.3.2.26");
/// SHA-224
pub const SHA224: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.4");
/// SHA-256
pub const SHA256: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.1");
/// SHA-384
pub const SHA384: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.2");
/// SHA-512
pub const SHA512: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.3");
/// SHA-512/224
pub const SHA512_224: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.5");
/// SHA-512/256
pub const SHA512_256: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.6");
/// SHA3-224
pub const SHA3_224: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.7");
/// SHA3-256
pub const SHA3_256: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.8");
/// SHA3-384
pub const SHA3_384: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.9");
/// SHA3-512
pub const SHA3_512: ObjectIdentifier = oid("2.16.840.1.101.3.4.2.10");

// RSA
/// `rsaEncryption`
pub const RSA_ENCRYPTION: ObjectIdentifier = oid("1.2.840.113549.1.1.1");
/// `id-RSAES-OAEP`
pub const RSAES_OAEP: ObjectIdentifier = oid("1.2.840.113549.1.1.7");
/// `id-mgf1`
pub const MGF1: ObjectIdentifier = oid("1.2.840.113549.1.1.8");
/// `id-pSpecified`
pub const P_SPECIFIED: ObjectIdentifier = oid("1.2.840.113549.1.1.9");
/// `id-RSASSA-PSS`
pub const RSASSA_PSS: ObjectIdentifier = oid("1.2.840.113549.1.1.10");
/// `sha1WithRSAEncryption`
pub const SHA1_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.5");
/// `sha224WithRSAEncryption`
pub const SHA224_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.14");
/// `sha256WithRSAEncryption`
pub const SHA256_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.11");
/// `sha384WithRSAEncryption`
pub const SHA384_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.12");
/// `sha512WithRSAEncryption`
pub const SHA512_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.13");
/// `sha512-224WithRSAEncryption`
pub const SHA512_224_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.15");
/// `sha512-256WithRSAEncryption`
pub const SHA512_256_WITH_RSA: ObjectIdentifier = oid("1.2.840.113549.1.1.16");
/// `id-rsassa-pkcs1-v1_5-with-sha3-224`
pub const SHA3_224_WITH_RSA: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.13");
/// `id-rsassa-pkcs1-v1_5-with-sha3-256`
pub const SHA3_256_WITH_RSA: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.14");
/// `id-rsassa-pkcs1-v1_5-with-sha3-384`
pub const SHA3_384_WITH_RSA: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.15");
/// `id-rsassa-pkcs1-v1_5-with-sha3-512`
pub const SHA3_512_WITH_RSA: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.16");

// elliptic curves
/// `id-ecPublicKey`
pub const EC_PUBLIC_KEY: ObjectIdentifier = oid("1.2.840.10045.2.1");
/// `secp256r1`
pub const SECP256R1: ObjectIdentifier = oid("1.2.840.10045.3.1.7");
/// `secp384r1`
pub const SECP384R1: ObjectIdentifier = oid("1.3.132.0.34");
/// `ecdsa-with-SHA1`
pub const ECDSA_WITH_SHA1: ObjectIdentifier = oid("1.2.840.10045.4.1");
/// `ecdsa-with-SHA224`
pub const ECDSA_WITH_SHA224: ObjectIdentifier = oid("1.2.840.10045.4.3.1");
/// `ecdsa-with-SHA256`
pub const ECDSA_WITH_SHA256: ObjectIdentifier = oid("1.2.840.10045.4.3.2");
/// `ecdsa-with-SHA384`
pub const ECDSA_WITH_SHA384: ObjectIdentifier = oid("1.2.840.10045.4.3.3");
/// `ecdsa-with-SHA512`
pub const ECDSA_WITH_SHA512: ObjectIdentifier = oid("1.2.840.10045.4.3.4");
/// `id-ecdsa-with-sha3-224`
pub const ECDSA_WITH_SHA3_224: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.9");
/// `id-ecdsa-with-sha3-256`
pub const ECDSA_WITH_SHA3_256: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.10");
/// `id-ecdsa-with-sha3-384`
pub const ECDSA_WITH_SHA3_384: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.11");
/// `id-ecdsa-with-sha3-512`
pub const ECDSA_WITH_SHA3_512: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.12");

// DSA
/// `id-dsa`
pub const DSA: ObjectIdentifier = oid("1.2.840.10040.4.1");
/// `id-dsa-with-sha1`
pub const DSA_WITH_SHA1: ObjectIdentifier = oid("1.2.840.10040.4.3");
/// `id-dsa-with-sha224`
pub const DSA_WITH_SHA224: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.1");
/// `id-dsa-with-sha256`
pub const DSA_WITH_SHA256: ObjectIdentifier = oid("2.16.840.1.101.3.4.3.2");

// content encryption
/// `des-ede3-cbc`
pub const DES_EDE3_CBC: ObjectIdentifier = oid("1.2.840.113549.3.7");
/// `rc2-cbc`
pub const RC2_CBC: ObjectIdentifier = oid("1.2.840.113549.3.2");
/// `id-aes128-CBC`
pub const AES128_CBC: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.2");
/// `id-aes192-CBC`
pub const AES192_CBC: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.22");
/// `id-aes256-CBC`
pub const AES256_CBC: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.42");
/// `id-aes128-GCM`
pub const AES128_GCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.6");
/// `id-aes192-GCM`
pub const AES192_GCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.26");
/// `id-aes256-GCM`
pub const AES256_GCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.46");
/// `id-aes128-CCM`
pub const AES128_CCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.7");
/// `id-aes192-CCM`
pub const AES192_CCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.27");
/// `id-aes256-CCM`
pub const AES256_CCM: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.47");
/// `camellia128-cbc`
pub const CAMELLIA128_CBC: ObjectIdentifier = oid("1.2.392.200011.61.1.1.1.2");
/// `camellia192-cbc`
pub const CAMELLIA192_CBC: ObjectIdentifier = oid("1.2.392.200011.61.1.1.1.3");
/// `camellia256-cbc`
pub const CAMELLIA256_CBC: ObjectIdentifier = oid("1.2.392.200011.61.1.1.1.4");
/// `id-seedCBC`
pub const SEED_CBC: ObjectIdentifier = oid("1.2.410.200004.1.4");

// key wrap
/// `id-aes128-wrap`
pub const AES128_WRAP: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.5");
/// `id-aes192-wrap`
pub const AES192_WRAP: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.25");
/// `id-aes256-wrap`
pub const AES256_WRAP: ObjectIdentifier = oid("2.16.840.1.101.3.4.1.45");
/// `id-alg-CMS3DESwrap`
pub const DES_EDE3_WRAP: ObjectIdentifier = oid("1.2.840.113549.1.9.16.3.6");
/// `id-camellia128-wrap`
pub const CAMELLIA128_WRAP: ObjectIdentifier = oid("1.2.392.200011.61.1.1.3.2");
/// `id-camellia192-wrap`
pub const CAMELLIA192_WRAP: ObjectIdentifier = oid("1.2.392.200011.61.1.1.3.3");
/// `id-camellia256-wrap`
pub const CAMELLIA256_WRAP: ObjectIdentifier = oid("1.2.392.200011.61.1.1.3.4");
/// `id-npki-app-cmsSeed-wrap`
pub const SEED_WRAP: ObjectIdentifier = oid("1.2.410.200004.7.1.1.1");

// password based
/// `id-PBKDF2`
pub const PBKDF2: ObjectIdentifier = oid("1.2.840.113549.1.5.12");
/// `id-alg-PWRI-KEK`
pub const PWRI_KEK: ObjectIdentifier = oid("1.2.840.113549.1.9.16.3.9");
/// `id-hmacWithSHA1`
pub const HMAC_WITH_SHA1: ObjectIdentifier = oid("1.2.840.113549.2.7");
/// `id-hmacWithSHA224`
pub const HMAC_WITH_SHA224: ObjectIdentifier = oid("1.2.840.113549.2.8");
/// `id-hmacWithSHA256`
pub const HMAC_WITH_SHA256: ObjectIdentifier = oid("1.2.840.113549.2.9");
/// `id-hmacWithSHA384`
pub const HMAC_WITH_SHA384: ObjectIdentifier = oid("1.2.840.113549.2.10");
/// `id-hmacWithSHA512`
pub const HMAC_WITH_SHA512: ObjectIdentifier = oid("1.2.840.113549.2.11");

// key agreement (RFC 5753)
/// `dhSinglePass-stdDH-sha1kdf-scheme`
pub const ECDH_STD_SHA1KDF: ObjectIdentifier = oid("1.3.133.16.840.63.0.2");
/// `dhSinglePass-stdDH-sha224kdf-scheme`
pub const ECDH_STD_SHA224KDF: ObjectIdentifier = oid("1.3.132.1.11.0");
/// `dhSinglePass-stdDH-sha256kdf-scheme`
pub const ECDH_STD_SHA256KDF: ObjectIdentifier = oid("1.3.132.1.11.1");
/// `dhSinglePass-stdDH-sha384kdf-scheme`
pub const ECDH_STD_SHA384KDF: ObjectIdentifier = oid("1.3.132.1.11.2");
/// `dhSinglePass-stdDH-sha512kdf-scheme`
pub const ECDH_STD_SHA512KDF: ObjectIdentifier = oid("1.3.132.1.11.3");
/// `dhSinglePass-cofactorDH-sha1kdf-scheme`
pub const ECDH_COFACTOR_SHA1KDF: ObjectIdentifier = oid("1.3.133.16.840.63.0.3");
/// `dhSinglePass-cofactorDH-sha224kdf-scheme`
pub const ECDH_COFACTOR_SHA224KDF: ObjectIdentifier = oid("1.3.132.1.14.0");
/// `dhSinglePass-cofactorDH-sha256kdf-scheme`
pub const ECDH_COFACTOR_SHA256KDF: ObjectIdentifier = oid("1.3.132.1.14.1");
/// `dhSinglePass-cofactorDH-sha384kdf-scheme`
pub const ECDH_COFACTOR_SHA384KDF: ObjectIdentifier = oid("1.3.132.1.14.2");
/// `dhSinglePass-cofactorDH-sha512kdf-scheme`
pub const ECDH_COFACTOR_SHA512KDF: ObjectIdentifier = oid("1.3.132.1.14.3");
/// `mqvSinglePass-sha1kdf-scheme`
pub const ECMQV_SHA1KDF: ObjectIdentifier = oid("1.3.133.16.840.63.0.16");
/// `mqvSinglePass-sha224kdf-scheme`
pub const ECMQV_SHA224KDF: ObjectIdentifier = oid("1.3.132.1.15.0");
/// `mqvSinglePass-sha256kdf-scheme`
pub const ECMQV_SHA256KDF: ObjectIdentifier = oid("1.3.132.1.15.1");
/// `mqvSinglePass-sha384kdf-scheme`
pub const ECMQV_SHA384KDF: ObjectIdentifier = oid("1.3.132.1.15.2");
/// `mqvSinglePass-sha512kdf-scheme`
pub const ECMQV_SHA512KDF: ObjectIdentifier = oid("1.3.132.1.15.3");

// certificates
/// `id-ce-subjectKeyIdentifier`
pub const SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = oid("2.5.29.14");
