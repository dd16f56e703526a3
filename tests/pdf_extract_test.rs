/// PDF extraction against a generated document: text on page one, a blank
/// page after it.
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use sagecrawl::crawl::extract::{parse_any_to_text, parse_pdf_to_text};
use std::path::PathBuf;

fn write_hello_world_pdf(path: &PathBuf) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 48.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello World")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().unwrap(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    // Second page with an empty content stream.
    let blank_content_id = doc.add_object(Stream::new(
        dictionary! {},
        Content { operations: vec![] }.encode().unwrap(),
    ));
    let blank_page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => blank_content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into(), blank_page_id.into()],
        "Count" => 2,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn extracts_text_from_first_page_and_ignores_blank_pages() {
    let dir = std::env::temp_dir().join(format!("sagecrawl-pdf-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let pdf_path = dir.join("hello.pdf");
    write_hello_world_pdf(&pdf_path);

    let text = parse_pdf_to_text(&pdf_path, 10);
    assert!(
        text.contains("Hello World"),
        "extracted text was: {:?}",
        text
    );

    // Routing by extension goes through the same path.
    let routed = parse_any_to_text(&pdf_path);
    assert!(routed.contains("Hello World"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupt_pdf_degrades_to_empty_text() {
    let dir = std::env::temp_dir().join(format!("sagecrawl-pdf-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let pdf_path = dir.join("broken.pdf");
    std::fs::write(&pdf_path, b"%PDF-1.5 not actually a pdf").unwrap();

    assert!(parse_pdf_to_text(&pdf_path, 10).is_empty());

    std::fs::remove_dir_all(&dir).ok();
}
