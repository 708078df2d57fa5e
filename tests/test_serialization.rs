mod fixtures;

use fixtures::*;
use indoc::indoc;
use insta::{assert_json_snapshot, assert_snapshot};
use pretty_assertions::assert_eq;
use streamdom::snapshot::to_json_value;
use streamdom::{ElementType, Flavor, HtmlParser, Parser, ParserSettings, Value, ValueType};

fn render(settings: ParserSettings, markup: &str) -> String {
    ensure_env_logger_initialized();
    let mut parser = Parser::with_configuration(settings);
    let root = parser.full_parse(markup).unwrap();
    assert!(!parser.errors_exist(), "{:?}", parser.errors());
    parser.render_inner(root)
}

fn render_xml(markup: &str) -> String {
    render(ParserSettings::default(), markup)
}

#[test]
fn test_attribute_values_escape_quotes_only() {
    assert_snapshot!(
        render_xml(r#"<container id="CONTAINER" test_attribute="'&quot;"/>"#),
        @r#"<CONTAINER id="CONTAINER" test_attribute="&apos;&quot;"></CONTAINER>"#
    );
    assert_snapshot!(
        render_xml(r#"<a href="x?a=1&amp;b=&lt;2&gt;"/>"#),
        @r#"<A href="x?a=1&b=<2>"></A>"#
    );
}

#[test]
fn test_canonical_markup_round_trips() {
    let canonical = indoc! {r#"
        <LIBRARY name="main"><SHELF n="1"><BOOK>One</BOOK><BOOK>Two</BOOK></SHELF><SHELF n="2"></SHELF></LIBRARY>"#};
    assert_eq!(render_xml(canonical), canonical);
}

#[test]
fn test_rendering_is_idempotent() {
    let once = render_xml(CATALOG);
    let twice = render_xml(&once);
    assert_eq!(twice, once);
    assert!(once.starts_with(r#"<CATALOG><BOOK id="bk101"><AUTHOR>Gambardella, Matthew</AUTHOR>"#));
}

#[test]
fn test_xml_text_with_markup_characters_uses_cdata() {
    assert_snapshot!(render_xml("<a>x &amp; y</a>"), @"<A><![CDATA[x & y]]></A>");
    assert_snapshot!(render_xml("<a><![CDATA[1 < 2]]></a>"), @"<A><![CDATA[1 < 2]]></A>");
    assert_snapshot!(render_xml("<a>plain</a>"), @"<A>plain</A>");

    let raw_text = ParserSettings::new().data_as_children(Some(false));
    assert_snapshot!(
        render(raw_text, "<a><b/>x]]&gt;y&lt;</a>"),
        @"<A><B></B><![CDATA[x]]]]><![CDATA[>y<]]></A>"
    );
}

#[test]
fn test_html_flavor_escapes_text() {
    let html = ParserSettings::new().flavor(Flavor::Html);
    assert_snapshot!(
        render(html, "<p>a &lt; b &amp;&amp; c</p>"),
        @"<P>a &lt; b &amp;&amp; c</P>"
    );
}

#[test]
fn test_whitespace_only_text() {
    let markup = "<a> <b/>\n\t</a>";
    assert_eq!(render_xml(markup), "<A><B></B></A>");

    let keep = ParserSettings::new().skip_whitespace_text(false);
    assert_eq!(render(keep, markup), "<A> <B></B>\n\t</A>");
}

fn item_name(settings: ParserSettings) -> Option<Value> {
    ensure_env_logger_initialized();
    let item = ElementType::new("item")
        .expect_value("name", ValueType::STRING)
        .unwrap()
        .into_ref();
    let mut parser = Parser::with_configuration(settings);
    parser.register_node(item);
    let root = parser.full_parse("<item><name>   </name></item>").unwrap();
    assert!(!parser.errors_exist(), "{:?}", parser.errors());

    let doc = parser.document();
    let item = doc.child(root, 0).unwrap();
    assert!(!doc[item].has_errors(), "{:?}", doc[item].errors());
    doc[item].field("name").cloned()
}

#[test]
fn test_whitespace_only_text_in_a_scalar_field() {
    assert_eq!(item_name(ParserSettings::default()), None);

    let keep = ParserSettings::new().skip_whitespace_text(false);
    assert_eq!(item_name(keep), Some(Value::Str("   ".to_string())));
}

#[test]
fn test_case_folding_can_be_disabled() {
    let settings = ParserSettings::new().case_folding(false);
    assert_eq!(render(settings, "<Root><child/></Root>"), "<Root><child></child></Root>");
}

#[test]
fn test_mixed_content_keeps_document_order() {
    assert_eq!(
        render_xml("<p>one <b>two</b> three</p>"),
        "<P>one <B>two</B> three</P>"
    );

    // Without text children, raw text is written after the elements.
    let raw_text = ParserSettings::new().data_as_children(Some(false));
    assert_eq!(
        render(raw_text, "<p>one <b>two</b></p>"),
        "<P><B>two</B>one </P>"
    );
}

#[test]
fn test_html_document() {
    ensure_env_logger_initialized();
    let mut parser = HtmlParser::new().unwrap();
    let html = parser
        .full_parse(indoc! {r#"
            <html xmlns="http://www.w3.org/1999/xhtml">
              <head><title>Report</title></head>
              <body><h1>Totals</h1><p class="note">a &lt; b</p></body>
            </html>
        "#})
        .unwrap();

    assert_eq!(parser.title(), Some("Report"));
    assert_snapshot!(
        parser.render_inner(html),
        @r#"<HTML xmlns="http://www.w3.org/1999/xhtml"><HEAD><TITLE></TITLE></HEAD><BODY><H1>Totals</H1><P class="note">a &lt; b</P></BODY></HTML>"#
    );
}

#[test]
fn test_json_snapshot_of_a_subtree() {
    ensure_env_logger_initialized();
    let mut parser = Parser::new();
    parser.register_node(catalog_prototype());
    let root = parser
        .full_parse(r#"<catalog><book id="bk9"><title>Short</title><price>3</price></book></catalog>"#)
        .unwrap();
    let catalog = parser.document().child(root, 0).unwrap();

    assert_json_snapshot!(to_json_value(parser.document(), catalog), @r#"
    {
      "name": "CATALOG",
      "fields": {
        "BOOK": [
          {
            "name": "BOOK",
            "attributes": {
              "id": "bk9"
            },
            "fields": {
              "TITLE": "Short",
              "PRICE": 3.0,
              "ID": "bk9"
            },
            "children": [
              {
                "name": "TITLE"
              },
              {
                "name": "PRICE"
              }
            ]
          }
        ]
      },
      "children": [
        {
          "name": "BOOK",
          "attributes": {
            "id": "bk9"
          },
          "fields": {
            "TITLE": "Short",
            "PRICE": 3.0,
            "ID": "bk9"
          },
          "children": [
            {
              "name": "TITLE"
            },
            {
              "name": "PRICE"
            }
          ]
        }
      ]
    }
    "#);
}
