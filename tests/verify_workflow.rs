//! End-to-end tests of the verify workflow against real OpenSSL signatures.

mod common;

use std::fs;

use common::{
    data_message, make_ca, openssl_signed, outer_to_ber, run_workflow, tamper, trust_dir,
    LeafProfile, SignedDataBuilder, SignerEntry, Workspace, OID_DATA, OID_SIGNED_DATA,
};
use openssl::pkcs7::Pkcs7Flags;
use p7verify::{
    CertUsage, ChunkSize, Disposition, ExitStatus, P7vError, TrustDecision, VerifyOptions,
};

const PAYLOAD: &[u8] = b"p7verify release payload 1.4.2 -- the quick brown fox";

#[test]
fn trusted_package_round_trips() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty()));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::Success, "{:?}", run.outcome.error);
    assert_eq!(run.outcome.disposition, Disposition::Retained(output.clone()));
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
    match run.outcome.decision {
        Some(TrustDecision::Trusted(summary)) => {
            assert_eq!(summary.signed_levels, 1);
            assert_eq!(summary.signers_verified, 1);
        }
        other => panic!("unexpected decision {other:?}"),
    }

    let lines: Vec<&str> = run.diagnostics.lines().collect();
    assert!(lines[0].starts_with("p7verify version "));
    assert_eq!(lines[1], format!("opened '{}' for reading.", input.display()));
    assert_eq!(lines[2], format!("opened '{}' for writing.", output.display()));
    assert_eq!(lines[3], "initialized.");
    assert_eq!(lines[4], "signed by 'Release Signer'");
    assert_eq!(lines[5], "data extracted.");
    assert_eq!(lines[6], "exiting with status 0");
}

#[test]
fn tiny_chunks_produce_identical_output() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty()));
    let output = ws.output_path();

    let options = VerifyOptions {
        chunk_size: ChunkSize::new(1).unwrap(),
        ..VerifyOptions::default()
    };
    let run = run_workflow(&input, &output, Some(trust.path()), options);

    assert_eq!(run.outcome.status, ExitStatus::Success);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
}

#[test]
fn tampered_payload_fails_closed() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let signed = openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty());
    let input = ws.write_input(&tamper(&signed, b"quick"));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    assert_eq!(run.outcome.status.code(), 4);
    match &run.outcome.error {
        Some(P7vError::VerificationFailed(reason)) => {
            assert!(reason.contains("DigestMismatch"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(run.outcome.disposition, Disposition::Deleted(output.clone()));
    assert!(!output.exists());
    assert!(!run.diagnostics.contains("data extracted."));
    assert!(run.diagnostics.contains("exiting with status 4"));
}

#[test]
fn skipping_verification_emits_tampered_content() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let ws = Workspace::new();
    let signed = openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty());
    let tampered = tamper(&signed, b"quick");
    let input = ws.write_input(&tampered);
    let output = ws.output_path();

    let options = VerifyOptions {
        skip_verification: true,
        ..VerifyOptions::default()
    };
    // No trust store directory: the system defaults are enough when nothing
    // gets verified.
    let run = run_workflow(&input, &output, None, options);

    assert_eq!(run.outcome.status, ExitStatus::Success);
    assert_eq!(run.outcome.decision, Some(TrustDecision::Skipped));
    let written = fs::read(&output).unwrap();
    assert_ne!(written, PAYLOAD);
    assert_eq!(written.len(), PAYLOAD.len());
    assert!(run
        .diagnostics
        .contains("p7verify: warning: verification skipped as requested!"));
    assert!(!run.diagnostics.contains("signed by"));
}

#[test]
fn unsigned_data_passes_through() {
    let ws = Workspace::new();
    let input = ws.write_input(&data_message(PAYLOAD));
    let output = ws.output_path();
    let trust = tempfile::tempdir().unwrap();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::Success);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
    match run.outcome.decision {
        Some(TrustDecision::Trusted(summary)) => assert!(summary.is_unsigned()),
        other => panic!("unexpected decision {other:?}"),
    }
}

#[test]
fn require_signed_rejects_unsigned_data() {
    let ws = Workspace::new();
    let input = ws.write_input(&data_message(PAYLOAD));
    let output = ws.output_path();
    let trust = tempfile::tempdir().unwrap();

    let options = VerifyOptions {
        require_signed: true,
        ..VerifyOptions::default()
    };
    let run = run_workflow(&input, &output, Some(trust.path()), options);

    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    assert!(!output.exists());
}

#[test]
fn signer_from_unknown_authority_is_rejected() {
    let trusted_ca = make_ca("Trusted Root");
    let rogue_ca = make_ca("Rogue Root");
    let signer = rogue_ca.issue("Impostor", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&trusted_ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty()));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    let reason = run.outcome.error.unwrap().to_string();
    assert!(reason.contains("SigningCertNotTrusted"), "{reason}");
    assert!(run.diagnostics.contains("signed by 'Impostor'"));
    assert!(run.diagnostics.contains("signer 0: SigningCertNotTrusted"));
    assert!(!output.exists());
}

#[test]
fn certificate_usage_is_enforced() {
    let ca = make_ca("Test Root");
    let mail_signer = ca.issue("Mail Signer", LeafProfile::EmailProtection);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&mail_signer, PAYLOAD, Pkcs7Flags::empty()));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());
    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    assert!(!output.exists());

    let options = VerifyOptions {
        usage: CertUsage::EmailSigner,
        ..VerifyOptions::default()
    };
    let run = run_workflow(&input, &output, Some(trust.path()), options);
    assert_eq!(run.outcome.status, ExitStatus::Success);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
}

#[test]
fn leaf_without_usage_extensions_is_accepted() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Legacy Signer", LeafProfile::Bare);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty()));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());
    assert_eq!(run.outcome.status, ExitStatus::Success, "{:?}", run.outcome.error);
}

#[test]
fn signature_without_signed_attributes_verifies() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::NOATTR));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());
    assert_eq!(run.outcome.status, ExitStatus::Success, "{:?}", run.outcome.error);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
}

#[test]
fn detached_signature_cannot_be_verified() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let input = ws.write_input(&openssl_signed(&signer, PAYLOAD, Pkcs7Flags::DETACHED));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());
    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    assert!(!output.exists());
}

#[test]
fn ber_encoded_envelope_is_accepted() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let signed = openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty());
    let input = ws.write_input(&outer_to_ber(&signed));
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());
    assert_eq!(run.outcome.status, ExitStatus::Success, "{:?}", run.outcome.error);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
}

#[test]
fn nested_signed_data_verifies_every_level() {
    let ca = make_ca("Test Root");
    let author = ca.issue("Author", LeafProfile::CodeSigning);
    let publisher = ca.issue("Publisher", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);

    let inner = SignedDataBuilder::new(OID_DATA, PAYLOAD)
        .signer(SignerEntry::good(&author))
        .build();
    let outer = SignedDataBuilder::new(OID_SIGNED_DATA, &inner)
        .signer(SignerEntry::good(&publisher))
        .build_message();

    let ws = Workspace::new();
    let input = ws.write_input(&outer);
    let output = ws.output_path();
    let options = VerifyOptions {
        chunk_size: ChunkSize::new(5).unwrap(),
        ..VerifyOptions::default()
    };
    let run = run_workflow(&input, &output, Some(trust.path()), options);

    assert_eq!(run.outcome.status, ExitStatus::Success, "{:?}", run.outcome.error);
    assert_eq!(fs::read(&output).unwrap(), PAYLOAD);
    match run.outcome.decision {
        Some(TrustDecision::Trusted(summary)) => {
            assert_eq!(summary.signed_levels, 2);
            assert_eq!(summary.signers_verified, 2);
        }
        other => panic!("unexpected decision {other:?}"),
    }
    let publisher_line = run.diagnostics.find("signed by 'Publisher'").unwrap();
    let author_line = run.diagnostics.find("signed by 'Author'").unwrap();
    assert!(publisher_line < author_line);
}

#[test]
fn first_failing_signer_stops_verification() {
    let ca = make_ca("Test Root");
    let a = ca.issue("Signer A", LeafProfile::CodeSigning);
    let b = ca.issue("Signer B", LeafProfile::CodeSigning);
    let c = ca.issue("Signer C", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);

    let message = SignedDataBuilder::new(OID_DATA, PAYLOAD)
        .signer(SignerEntry::good(&a))
        .signer(SignerEntry::corrupted(&b))
        .signer(SignerEntry::good(&c))
        .build_message();

    let ws = Workspace::new();
    let input = ws.write_input(&message);
    let output = ws.output_path();
    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::VerificationFailed);
    let reason = run.outcome.error.unwrap().to_string();
    assert!(reason.contains("signer 1: BadSignature"), "{reason}");
    assert!(run.diagnostics.contains("signed by 'Signer A'"));
    assert!(run.diagnostics.contains("signed by 'Signer B'"));
    assert!(!run.diagnostics.contains("Signer C"));
    assert!(!output.exists());
}

#[test]
fn damaged_embedded_certificate_fails_import() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);

    let message = SignedDataBuilder::new(OID_DATA, PAYLOAD)
        .signer(SignerEntry::good(&signer))
        .raw_certificate(&[0x30, 0x03, 0x02, 0x01, 0x01])
        .build_message();

    let ws = Workspace::new();
    let input = ws.write_input(&message);
    let output = ws.output_path();
    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::CertImportFailed);
    assert_eq!(run.outcome.status.code(), 9);
    assert!(!output.exists());
}

#[test]
fn missing_input_is_reported() {
    let ws = Workspace::new();
    let input = ws.dir.path().join("absent.p7m");
    let output = ws.output_path();

    let run = run_workflow(&input, &output, None, VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::InputOpenFailed);
    assert_eq!(run.outcome.disposition, Disposition::NotCreated);
    assert!(run
        .diagnostics
        .contains(&format!("failed to open input file '{}'!", input.display())));
    assert!(!output.exists());
}

#[test]
fn unwritable_output_is_reported() {
    let ws = Workspace::new();
    let input = ws.write_input(&data_message(PAYLOAD));
    let output = ws.dir.path().join("no-such-dir").join("payload.bin");

    let run = run_workflow(&input, &output, None, VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::OutputOpenFailed);
    assert!(run.diagnostics.contains("failed to open output file"));
}

#[test]
fn missing_trust_store_removes_output() {
    let ws = Workspace::new();
    let input = ws.write_input(&data_message(PAYLOAD));
    let output = ws.output_path();
    let trust = ws.dir.path().join("no-trust-here");

    let run = run_workflow(&input, &output, Some(&trust), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::TrustStoreInitFailed);
    assert!(run.diagnostics.contains("initialization failed (5)!"));
    assert_eq!(run.outcome.disposition, Disposition::Deleted(output.clone()));
    assert!(!output.exists());
}

#[test]
fn truncated_package_fails_at_finish() {
    let ca = make_ca("Test Root");
    let signer = ca.issue("Release Signer", LeafProfile::CodeSigning);
    let trust = trust_dir(&[&ca]);
    let ws = Workspace::new();
    let signed = openssl_signed(&signer, PAYLOAD, Pkcs7Flags::empty());
    let input = ws.write_input(&signed[..signed.len() - 40]);
    let output = ws.output_path();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::DecoderFinishFailed);
    assert!(!output.exists());
}

#[test]
fn garbage_input_fails_while_streaming() {
    let ws = Workspace::new();
    let input = ws.write_input(b"this is not a pkcs7 package at all");
    let output = ws.output_path();
    let trust = tempfile::tempdir().unwrap();

    let run = run_workflow(&input, &output, Some(trust.path()), VerifyOptions::default());

    assert_eq!(run.outcome.status, ExitStatus::DecoderUpdateFailed);
    assert!(!output.exists());
}
