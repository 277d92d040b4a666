//! `SignedData` interoperability, countersignature and attribute tests.

use std::io::Read;

use cms_envelope::{
    attributes::{content_type_attribute, AttributeTable, SimpleAttributeTable},
    cert::certificate_from_pem,
    content_info::{CmsVersion, KeyIdentifier},
    registry::{oids, DigestAlgorithm, SignatureAlgorithm},
    signed::{SignedDataGenerator, SignedDataParser},
    signer::{SignerInfoGenerator, SignerInformationStore, SigningKey, Verification, VerifierKey},
    Certificate, Error, SignedData,
};
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};

const HELLO: &[u8] = include_bytes!("examples/openssl/hello.txt");

fn certificate(name: &str) -> Certificate {
    let pem = std::fs::read_to_string(format!("tests/examples/keys/{name}.crt")).unwrap();
    certificate_from_pem(&pem).unwrap()
}

fn rsa_key(name: &str) -> RsaPrivateKey {
    let pem = std::fs::read_to_string(format!("tests/examples/keys/{name}.pem")).unwrap();
    RsaPrivateKey::from_pkcs8_pem(&pem).unwrap()
}

fn rsa_signer(name: &str) -> SignerInfoGenerator {
    SignerInfoGenerator::new(
        KeyIdentifier::issuer_and_serial_of(&certificate(name)),
        SigningKey::Rsa(rsa_key(name)),
        DigestAlgorithm::Sha256,
    )
}

fn verify_all(signed: &SignedData) -> usize {
    let signers = signed.signer_infos().unwrap();
    for signer in &signers {
        let cert = signed.certificate_for(signer.sid()).expect("signer certificate");
        let key = VerifierKey::from_certificate(&cert).unwrap();
        assert_eq!(signer.verify(&key).unwrap(), Verification::Valid);
    }
    signers.len()
}

#[test]
fn openssl_signatures_verify() {
    for name in ["signed-rsa-sha256", "signed-ecdsa-sha256", "signed-rsapss-sha256"] {
        let ber = std::fs::read(format!("tests/examples/openssl/{name}.der")).unwrap();
        let signed = SignedData::from_ber(&ber).unwrap();
        assert_eq!(signed.version(), CmsVersion::V1, "{name}");
        assert_eq!(signed.content_type(), oids::ID_DATA);
        assert_eq!(signed.content(), Some(HELLO));
        assert_eq!(verify_all(&signed), 1, "{name}");
    }
}

#[test]
fn openssl_pss_parameters() {
    let ber = std::fs::read("tests/examples/openssl/signed-rsapss-sha256.der").unwrap();
    let signed = SignedData::from_ber(&ber).unwrap();
    let signers = signed.signer_infos().unwrap();
    let signer = signers.signers().first().unwrap();
    assert!(signer.sid().matches(&certificate("rsa-bob")));
    match SignatureAlgorithm::from_identifier(&signer.info().signature_algorithm).unwrap() {
        SignatureAlgorithm::RsaPss(params) => assert_eq!(params.digest, DigestAlgorithm::Sha256),
        other => panic!("unexpected algorithm {other:?}"),
    }
}

#[test]
fn openssl_stream_through_the_parser() {
    let ber = std::fs::read("tests/examples/openssl/signed-rsa-sha256-stream.der").unwrap();
    let mut parser = SignedDataParser::new(&ber[..]).unwrap();
    assert!(!parser.is_detached());
    let mut content = Vec::new();
    parser.content().unwrap().read_to_end(&mut content).unwrap();
    assert_eq!(content, HELLO);

    let signers = parser.signer_infos().unwrap();
    let key = VerifierKey::from_certificate(&certificate("rsa-alice")).unwrap();
    for signer in &signers {
        assert!(signer.verify(&key).unwrap().is_valid());
    }
    assert_eq!(parser.certificate_choices().len(), 1);
}

#[test]
fn tampered_content_is_a_digest_mismatch() {
    let ber = std::fs::read("tests/examples/openssl/signed-rsa-sha256.der").unwrap();
    let signed = SignedData::from_ber(&ber).unwrap();
    let key = VerifierKey::from_certificate(&certificate("rsa-alice")).unwrap();
    let signers = signed.signer_infos_detached(b"HelloWorle").unwrap();
    for signer in &signers {
        assert_eq!(signer.verify(&key).unwrap(), Verification::DigestMismatch);
    }
}

#[test]
fn wrong_key_is_a_signature_mismatch() {
    let ber = std::fs::read("tests/examples/openssl/signed-rsa-sha256.der").unwrap();
    let signed = SignedData::from_ber(&ber).unwrap();
    let bob = VerifierKey::from_certificate(&certificate("rsa-bob")).unwrap();
    for signer in &signed.signer_infos().unwrap() {
        assert_eq!(signer.verify(&bob).unwrap(), Verification::SignatureMismatch);
    }
}

#[test]
fn missing_message_digest_is_an_attribute_violation() {
    let mut rng = ChaCha8Rng::from_seed([42; 32]);
    let attributes = AttributeTable::new().with(content_type_attribute(oids::ID_DATA).unwrap());
    let mut generator = SignedDataGenerator::new()
        .add_signer(rsa_signer("rsa-alice").with_signed_attributes(SimpleAttributeTable(attributes)));
    assert!(matches!(
        generator.generate(oids::ID_DATA, HELLO, true, &mut rng),
        Err(Error::AttributeViolation(_))
    ));
}

#[test]
fn countersignature_integrity() {
    let mut rng = ChaCha8Rng::from_seed([42; 32]);
    let alice = certificate("rsa-alice");
    let bob = certificate("rsa-bob");
    let mut generator = SignedDataGenerator::new()
        .add_signer(rsa_signer("rsa-alice"))
        .add_certificate(&alice)
        .add_certificate(&bob);
    let der = generator.generate(oids::ID_DATA, HELLO, true, &mut rng).unwrap();
    let signed = SignedData::from_ber(&der).unwrap();

    let counter_signer = rsa_signer("rsa-bob");
    let countersigned: SignerInformationStore = signed
        .signer_infos()
        .unwrap()
        .iter()
        .map(|signer| signer.add_counter_signature(&counter_signer, &mut rng))
        .collect::<Result<_, _>>()
        .unwrap();
    let der = signed.replace_signers(&countersigned).to_der().unwrap();

    let signed = SignedData::from_ber(&der).unwrap();
    assert_eq!(verify_all(&signed), 1);
    let resolver = |sid: &KeyIdentifier| {
        signed
            .certificate_for(sid)
            .and_then(|cert| VerifierKey::from_certificate(&cert).ok())
    };
    let signers = signed.signer_infos().unwrap();
    let signer = signers.signers().first().unwrap();
    assert_eq!(signer.counter_signatures().unwrap().len(), 1);
    assert!(signer.verify_counter_signatures(resolver).unwrap());

    // A countersignature over a different signature value does not verify.
    let at = der
        .windows(signer.signature().len())
        .position(|window| window == signer.signature())
        .unwrap();
    let mut forged = der.clone();
    forged[at] ^= 1;
    let forged = SignedData::from_ber(&forged).unwrap();
    let signers = forged.signer_infos().unwrap();
    let signer = signers.signers().first().unwrap();
    assert_eq!(
        signer.verify(&VerifierKey::from_certificate(&alice).unwrap()).unwrap(),
        Verification::SignatureMismatch
    );
    let resolver = |sid: &KeyIdentifier| {
        forged
            .certificate_for(sid)
            .and_then(|cert| VerifierKey::from_certificate(&cert).ok())
    };
    assert!(!signer.verify_counter_signatures(resolver).unwrap());
}

#[test]
fn countersigner_without_a_key_is_a_key_mismatch() {
    let mut rng = ChaCha8Rng::from_seed([42; 32]);
    let mut generator = SignedDataGenerator::new().add_signer(rsa_signer("rsa-alice"));
    let der = generator.generate(oids::ID_DATA, HELLO, true, &mut rng).unwrap();
    let signed = SignedData::from_ber(&der).unwrap();
    let signers = signed.signer_infos().unwrap();
    let countersigned = signers
        .signers()
        .first()
        .unwrap()
        .add_counter_signature(&rsa_signer("rsa-bob"), &mut rng)
        .unwrap();
    assert!(matches!(
        countersigned.verify_counter_signatures(|_| None),
        Err(Error::KeyMismatch)
    ));
}
