use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

/// One text line: (font resource, size, x, y in PDF space, text)
pub type TextLine<'a> = (&'a str, i64, i64, i64, &'a str);

/// Writes a letter-size PDF with Helvetica (F1) and Helvetica-Bold (F2)
pub fn write_pdf(path: &Path, pages: &[Vec<TextLine>]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (font, size, x, y, text) in lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec![(*font).into(), (*size).into()]));
            operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Two-page travel guide: a title, three numbered headings, one section crossing the page break
pub fn write_travel_guide(path: &Path) {
    write_pdf(
        path,
        &[
            vec![
                ("F2", 24, 72, 720, "Annual Travel Guide"),
                ("F2", 16, 72, 680, "1. Coastal Beaches"),
                ("F1", 11, 72, 660, "The coastline offers sandy beaches and calm water."),
                ("F1", 11, 72, 646, "Families enjoy swimming and sailing near the towns."),
                ("F2", 16, 72, 610, "2. Mountain Hiking"),
                ("F1", 11, 72, 590, "Trails climb through pine forests to alpine lakes."),
                ("F1", 11, 300, 60, "..."),
                ("F1", 11, 300, 40, "12"),
            ],
            vec![
                ("F1", 11, 72, 720, "Guided hikes leave every morning from the village."),
                ("F2", 16, 72, 680, "3. Local Cuisine"),
                ("F1", 11, 72, 660, "Regional dishes feature fresh fish and olive oil."),
            ],
        ],
    );
}
