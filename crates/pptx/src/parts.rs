//! Package-level parts: content types, presentation, master, layout,
//! theme, notes master and document properties.

use crate::xml::{rel_type, Relationships, XmlPart, NS_A, NS_P, NS_R};
use deck_core::{Deck, Result, TemplateStyle};

/// Slide size in EMU (10in x 7.5in, 4:3 like the rendered images).
pub const SLIDE_CX: i64 = 9_144_000;
pub const SLIDE_CY: i64 = 6_858_000;

const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const CT_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
const CT_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
const CT_NOTES_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml";
const CT_NOTES_SLIDE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml";
const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
const CT_CORE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const CT_APP: &str = "application/vnd.openxmlformats-officedocument.extended-properties+xml";

/// `[Content_Types].xml` for `slides` slides, `notes` of which have notes.
pub fn content_types(slides: usize, notes: &[usize]) -> Result<Vec<u8>> {
    let mut xml = XmlPart::new()?;
    xml.start(
        "Types",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types")],
    )?;
    xml.empty(
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        ],
    )?;
    xml.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    xml.empty("Default", &[("Extension", "png"), ("ContentType", "image/png")])?;

    let mut overrides: Vec<(String, &str)> = vec![
        ("/ppt/presentation.xml".into(), CT_PRESENTATION),
        ("/ppt/slideMasters/slideMaster1.xml".into(), CT_MASTER),
        ("/ppt/slideLayouts/slideLayout1.xml".into(), CT_LAYOUT),
        ("/ppt/theme/theme1.xml".into(), CT_THEME),
        ("/docProps/core.xml".into(), CT_CORE),
        ("/docProps/app.xml".into(), CT_APP),
    ];
    if !notes.is_empty() {
        overrides.push(("/ppt/notesMasters/notesMaster1.xml".into(), CT_NOTES_MASTER));
        overrides.push(("/ppt/theme/theme2.xml".into(), CT_THEME));
    }
    overrides.extend((1..=slides).map(|n| (format!("/ppt/slides/slide{}.xml", n), CT_SLIDE)));
    overrides.extend(
        notes
            .iter()
            .map(|n| (format!("/ppt/notesSlides/notesSlide{}.xml", n), CT_NOTES_SLIDE)),
    );
    for (part, content_type) in &overrides {
        xml.empty(
            "Override",
            &[("PartName", part.as_str()), ("ContentType", *content_type)],
        )?;
    }
    xml.end("Types")?;
    Ok(xml.finish())
}

/// `_rels/.rels`.
pub fn root_rels() -> Result<Vec<u8>> {
    let mut rels = Relationships::new();
    rels.add(rel_type("officeDocument"), "ppt/presentation.xml");
    rels.add(
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties",
        "docProps/core.xml",
    );
    rels.add(rel_type("extended-properties"), "docProps/app.xml");
    rels.to_xml()
}

/// `ppt/presentation.xml` plus its relationships.
pub fn presentation(slides: usize, with_notes: bool) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rels = Relationships::new();
    let master_rid = rels.add(rel_type("slideMaster"), "slideMasters/slideMaster1.xml");
    let slide_rids: Vec<String> = (1..=slides)
        .map(|n| rels.add(rel_type("slide"), format!("slides/slide{}.xml", n)))
        .collect();
    let notes_rid = with_notes
        .then(|| rels.add(rel_type("notesMaster"), "notesMasters/notesMaster1.xml"));
    rels.add(rel_type("theme"), "theme/theme1.xml");

    let mut xml = XmlPart::new()?;
    xml.start(
        "p:presentation",
        &[("xmlns:a", NS_A), ("xmlns:r", NS_R), ("xmlns:p", NS_P), ("saveSubsetFonts", "1")],
    )?;
    xml.start("p:sldMasterIdLst", &[])?;
    xml.empty("p:sldMasterId", &[("id", "2147483648"), ("r:id", master_rid.as_str())])?;
    xml.end("p:sldMasterIdLst")?;
    if let Some(rid) = &notes_rid {
        xml.start("p:notesMasterIdLst", &[])?;
        xml.empty("p:notesMasterId", &[("r:id", rid.as_str())])?;
        xml.end("p:notesMasterIdLst")?;
    }
    xml.start("p:sldIdLst", &[])?;
    for (idx, rid) in slide_rids.iter().enumerate() {
        let id = (256 + idx).to_string();
        xml.empty("p:sldId", &[("id", id.as_str()), ("r:id", rid.as_str())])?;
    }
    xml.end("p:sldIdLst")?;
    let (cx, cy) = (SLIDE_CX.to_string(), SLIDE_CY.to_string());
    xml.empty(
        "p:sldSz",
        &[("cx", cx.as_str()), ("cy", cy.as_str()), ("type", "screen4x3")],
    )?;
    xml.empty("p:notesSz", &[("cx", cy.as_str()), ("cy", cx.as_str())])?;
    xml.end("p:presentation")?;
    Ok((xml.finish(), rels.to_xml()?))
}

/// Empty group-shape header every shape tree starts with.
pub fn sp_tree_header(xml: &mut XmlPart) -> Result<()> {
    xml.start("p:nvGrpSpPr", &[])?;
    xml.empty("p:cNvPr", &[("id", "1"), ("name", "")])?;
    xml.empty("p:cNvGrpSpPr", &[])?;
    xml.empty("p:nvPr", &[])?;
    xml.end("p:nvGrpSpPr")?;
    xml.start("p:grpSpPr", &[])?;
    xml.start("a:xfrm", &[])?;
    xml.empty("a:off", &[("x", "0"), ("y", "0")])?;
    xml.empty("a:ext", &[("cx", "0"), ("cy", "0")])?;
    xml.empty("a:chOff", &[("x", "0"), ("y", "0")])?;
    xml.empty("a:chExt", &[("cx", "0"), ("cy", "0")])?;
    xml.end("a:xfrm")?;
    xml.end("p:grpSpPr")?;
    Ok(())
}

fn color_map(xml: &mut XmlPart, name: &str) -> Result<()> {
    xml.empty(
        name,
        &[
            ("bg1", "lt1"),
            ("tx1", "dk1"),
            ("bg2", "lt2"),
            ("tx2", "dk2"),
            ("accent1", "accent1"),
            ("accent2", "accent2"),
            ("accent3", "accent3"),
            ("accent4", "accent4"),
            ("accent5", "accent5"),
            ("accent6", "accent6"),
            ("hlink", "hlink"),
            ("folHlink", "folHlink"),
        ],
    )?;
    Ok(())
}

/// `ppt/slideMasters/slideMaster1.xml` plus its relationships.
pub fn slide_master() -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rels = Relationships::new();
    let layout_rid = rels.add(rel_type("slideLayout"), "../slideLayouts/slideLayout1.xml");
    rels.add(rel_type("theme"), "../theme/theme1.xml");

    let mut xml = XmlPart::new()?;
    xml.start("p:sldMaster", &[("xmlns:a", NS_A), ("xmlns:r", NS_R), ("xmlns:p", NS_P)])?;
    xml.start("p:cSld", &[])?;
    xml.start("p:spTree", &[])?;
    sp_tree_header(&mut xml)?;
    xml.end("p:spTree")?;
    xml.end("p:cSld")?;
    color_map(&mut xml, "p:clrMap")?;
    xml.start("p:sldLayoutIdLst", &[])?;
    xml.empty("p:sldLayoutId", &[("id", "2147483649"), ("r:id", layout_rid.as_str())])?;
    xml.end("p:sldLayoutIdLst")?;
    xml.end("p:sldMaster")?;
    Ok((xml.finish(), rels.to_xml()?))
}

/// `ppt/slideLayouts/slideLayout1.xml` (blank) plus its relationships.
pub fn slide_layout() -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rels = Relationships::new();
    rels.add(rel_type("slideMaster"), "../slideMasters/slideMaster1.xml");

    let mut xml = XmlPart::new()?;
    xml.start(
        "p:sldLayout",
        &[
            ("xmlns:a", NS_A),
            ("xmlns:r", NS_R),
            ("xmlns:p", NS_P),
            ("type", "blank"),
            ("preserve", "1"),
        ],
    )?;
    xml.start("p:cSld", &[("name", "Blank")])?;
    xml.start("p:spTree", &[])?;
    sp_tree_header(&mut xml)?;
    xml.end("p:spTree")?;
    xml.end("p:cSld")?;
    xml.start("p:clrMapOvr", &[])?;
    xml.empty("a:masterClrMapping", &[])?;
    xml.end("p:clrMapOvr")?;
    xml.end("p:sldLayout")?;
    Ok((xml.finish(), rels.to_xml()?))
}

/// `ppt/notesMasters/notesMaster1.xml` plus its relationships.
pub fn notes_master() -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rels = Relationships::new();
    rels.add(rel_type("theme"), "../theme/theme2.xml");

    let mut xml = XmlPart::new()?;
    xml.start("p:notesMaster", &[("xmlns:a", NS_A), ("xmlns:r", NS_R), ("xmlns:p", NS_P)])?;
    xml.start("p:cSld", &[])?;
    xml.start("p:spTree", &[])?;
    sp_tree_header(&mut xml)?;
    xml.end("p:spTree")?;
    xml.end("p:cSld")?;
    color_map(&mut xml, "p:clrMap")?;
    xml.end("p:notesMaster")?;
    Ok((xml.finish(), rels.to_xml()?))
}

/// Theme carrying the template's colors and fonts.
pub fn theme(style: &TemplateStyle, name: &str) -> Result<Vec<u8>> {
    let mut xml = XmlPart::new()?;
    xml.start("a:theme", &[("xmlns:a", NS_A), ("name", name)])?;
    xml.start("a:themeElements", &[])?;

    xml.start("a:clrScheme", &[("name", name)])?;
    let accents = style.palette(6);
    let scheme: Vec<(&str, String)> = vec![
        ("a:dk1", style.title_color.hex()),
        ("a:lt1", style.background.hex()),
        ("a:dk2", style.body_color.hex()),
        ("a:lt2", style.background.mix(style.body_color, 0.1).hex()),
        ("a:accent1", accents[0].hex()),
        ("a:accent2", accents[1].hex()),
        ("a:accent3", accents[2].hex()),
        ("a:accent4", accents[3].hex()),
        ("a:accent5", accents[4].hex()),
        ("a:accent6", accents[5].hex()),
        ("a:hlink", style.accent.hex()),
        ("a:folHlink", style.body_color.hex()),
    ];
    for (slot, hex) in &scheme {
        xml.start(slot, &[])?;
        xml.empty("a:srgbClr", &[("val", hex.as_str())])?;
        xml.end(slot)?;
    }
    xml.end("a:clrScheme")?;

    xml.start("a:fontScheme", &[("name", name)])?;
    for font in ["a:majorFont", "a:minorFont"] {
        xml.start(font, &[])?;
        xml.empty("a:latin", &[("typeface", style.font_family.as_str())])?;
        xml.empty("a:ea", &[("typeface", "")])?;
        xml.empty("a:cs", &[("typeface", "")])?;
        xml.end(font)?;
    }
    xml.end("a:fontScheme")?;

    xml.start("a:fmtScheme", &[("name", name)])?;
    xml.start("a:fillStyleLst", &[])?;
    for _ in 0..3 {
        phclr_fill(&mut xml)?;
    }
    xml.end("a:fillStyleLst")?;
    xml.start("a:lnStyleLst", &[])?;
    for width in ["6350", "12700", "19050"] {
        xml.start("a:ln", &[("w", width)])?;
        phclr_fill(&mut xml)?;
        xml.end("a:ln")?;
    }
    xml.end("a:lnStyleLst")?;
    xml.start("a:effectStyleLst", &[])?;
    for _ in 0..3 {
        xml.start("a:effectStyle", &[])?;
        xml.empty("a:effectLst", &[])?;
        xml.end("a:effectStyle")?;
    }
    xml.end("a:effectStyleLst")?;
    xml.start("a:bgFillStyleLst", &[])?;
    for _ in 0..3 {
        phclr_fill(&mut xml)?;
    }
    xml.end("a:bgFillStyleLst")?;
    xml.end("a:fmtScheme")?;

    xml.end("a:themeElements")?;
    xml.end("a:theme")?;
    Ok(xml.finish())
}

fn phclr_fill(xml: &mut XmlPart) -> Result<()> {
    xml.start("a:solidFill", &[])?;
    xml.empty("a:schemeClr", &[("val", "phClr")])?;
    xml.end("a:solidFill")?;
    Ok(())
}

/// `docProps/core.xml`.
pub fn core_properties(deck: &Deck) -> Result<Vec<u8>> {
    let created = deck.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut xml = XmlPart::new()?;
    xml.start(
        "cp:coreProperties",
        &[
            (
                "xmlns:cp",
                "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
            ),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:dcterms", "http://purl.org/dc/terms/"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ],
    )?;
    xml.text_element("dc:title", &[], &deck.title)?;
    xml.text_element("dc:subject", &[], &format!("{} template", deck.template.as_str()))?;
    xml.text_element("cp:keywords", &[], &deck.tone)?;
    xml.text_element("dc:creator", &[], "deck-architect")?;
    xml.text_element("dcterms:created", &[("xsi:type", "dcterms:W3CDTF")], &created)?;
    xml.text_element("dcterms:modified", &[("xsi:type", "dcterms:W3CDTF")], &created)?;
    xml.end("cp:coreProperties")?;
    Ok(xml.finish())
}

/// `docProps/app.xml`.
pub fn app_properties(slides: usize, notes: usize) -> Result<Vec<u8>> {
    let mut xml = XmlPart::new()?;
    xml.start(
        "Properties",
        &[(
            "xmlns",
            "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties",
        )],
    )?;
    xml.text_element("Application", &[], "deck-architect")?;
    xml.text_element("Slides", &[], &slides.to_string())?;
    xml.text_element("Notes", &[], &notes.to_string())?;
    xml.end("Properties")?;
    Ok(xml.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::Template;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_content_types_lists_every_slide() {
        let xml = text(content_types(3, &[1, 3]).unwrap());
        assert!(xml.contains("/ppt/slides/slide3.xml"));
        assert!(!xml.contains("/ppt/slides/slide4.xml"));
        assert!(xml.contains("/ppt/notesSlides/notesSlide3.xml"));
        assert!(!xml.contains("/ppt/notesSlides/notesSlide2.xml"));
        assert!(xml.contains("notesMaster1.xml"));
    }

    #[test]
    fn test_presentation_slide_ids() {
        let (xml, rels) = presentation(2, false).unwrap();
        let xml = text(xml);
        assert!(xml.contains("<p:sldId id=\"256\" r:id=\"rId2\"/>"));
        assert!(xml.contains("<p:sldId id=\"257\" r:id=\"rId3\"/>"));
        assert!(!xml.contains("notesMasterIdLst"));
        assert!(text(rels).contains("theme/theme1.xml"));
    }

    #[test]
    fn test_theme_uses_template() {
        let style = Template::Corporate.style();
        let xml = text(theme(&style, "corporate").unwrap());
        assert!(xml.contains("typeface=\"Calibri\""));
        assert!(xml.contains(&style.accent.hex()));
    }
}
