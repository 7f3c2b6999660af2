//! Attachment tests.

use courier::{is_allowed_content_type, Attachment, Email, MailError, ALLOWED_CONTENT_TYPES};

// ============================================================================
// Constructor Tests
// ============================================================================

#[test]
fn from_bytes_creates_attachment() {
    let attachment = Attachment::from_bytes("notes.txt", b"content".to_vec());
    assert_eq!(attachment.filename, "notes.txt");
    assert_eq!(attachment.content_type, "text/plain");
    assert_eq!(attachment.data, b"content");
    assert_eq!(attachment.size(), 7);
}

#[test]
fn unknown_extension_uses_octet_stream() {
    let attachment = Attachment::from_bytes("unknown-file.xyz123", b"data".to_vec());
    assert_eq!(attachment.content_type, "application/octet-stream");
}

#[test]
fn content_type_can_be_overridden() {
    let attachment =
        Attachment::from_bytes("scan", b"data".to_vec()).content_type("image/png");
    assert_eq!(attachment.content_type, "image/png");
    assert!(attachment.validate().is_ok());
}

#[test]
fn from_path_reads_file() {
    let path = std::env::temp_dir().join(format!("courier-{}.txt", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"statement").unwrap();

    let attachment = Attachment::from_path(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(attachment.content_type, "text/plain");
    assert_eq!(attachment.data, b"statement");
    assert!(attachment.filename.ends_with(".txt"));
}

#[test]
fn from_path_missing_file_is_invalid() {
    let result = Attachment::from_path("/definitely/not/here.pdf");
    assert!(matches!(result, Err(MailError::InvalidAttachment(_))));
}

// ============================================================================
// Allow-list Tests
// ============================================================================

#[test]
fn allow_list_covers_documents_and_images() {
    for ty in ["application/pdf", "image/png", "image/jpeg", "text/plain"] {
        assert!(ALLOWED_CONTENT_TYPES.contains(&ty));
        assert!(is_allowed_content_type(ty));
    }
}

#[test]
fn allow_list_ignores_parameters_and_case() {
    assert!(is_allowed_content_type("text/plain; charset=utf-8"));
    assert!(is_allowed_content_type("Application/PDF"));
    assert!(!is_allowed_content_type("application/zip"));
    assert!(!is_allowed_content_type("text/html"));
}

#[test]
fn validate_rejects_disallowed_type() {
    let attachment = Attachment::from_bytes("archive.zip", vec![1, 2, 3]);
    match attachment.validate() {
        Err(MailError::UnsupportedContentType {
            filename,
            content_type,
        }) => {
            assert_eq!(filename, "archive.zip");
            assert_eq!(content_type, "application/zip");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn validate_rejects_empty_content() {
    let attachment = Attachment::from_bytes("empty.pdf", vec![]);
    assert!(matches!(
        attachment.validate(),
        Err(MailError::InvalidAttachment(_))
    ));
}

#[test]
fn validate_rejects_missing_filename() {
    let attachment = Attachment::from_bytes("", vec![1]).content_type("text/plain");
    assert!(matches!(
        attachment.validate(),
        Err(MailError::InvalidAttachment(_))
    ));
}

// ============================================================================
// Email Integration Tests
// ============================================================================

#[test]
fn email_can_have_multiple_attachments() {
    let email = Email::new()
        .to("recipient@example.com")
        .subject("Files attached")
        .text_body("See attached.")
        .attachment(Attachment::from_bytes("receipt.pdf", b"%PDF".to_vec()))
        .attachment(Attachment::from_bytes("chart.png", vec![0x89, 0x50, 0x4E, 0x47]));

    assert!(email.has_attachments());
    assert_eq!(email.attachments.len(), 2);
    assert_eq!(email.attachments[1].filename, "chart.png");
    assert!(email.is_valid());
}
