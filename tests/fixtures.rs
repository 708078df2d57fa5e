#![allow(dead_code)]
use indoc::indoc;
use std::sync::Once;
use streamdom::{Expected, ElementType, PrototypeRef, Scalar, Value, ValueType, Verdict};

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

pub const CATALOG: &str = indoc! {r#"
    <?xml version="1.0"?>
    <catalog>
       <book id="bk101">
          <author>Gambardella, Matthew</author>
          <title>XML Developer's Guide</title>
          <genre>Computer</genre>
          <price>44.95</price>
          <publish_date>2000-10-01</publish_date>
          <description>An in-depth look at creating applications
          with XML.</description>
       </book>
       <book id="bk102">
          <author>Ralls, Kim</author>
          <title>Midnight Rain</title>
          <genre>Fantasy</genre>
          <price>5.95</price>
          <publish_date>2000-12-16</publish_date>
          <description>A former architect battles corporate zombies.</description>
       </book>
       <book id="bk103">
          <author>Corets, Eva</author>
          <title>Maeve Ascendant</title>
          <genre>Fantasy</genre>
          <price>5.95</price>
          <publish_date>2000-11-17</publish_date>
          <description>After the collapse of a nanotechnology society.</description>
       </book>
    </catalog>
"#};

/// `BOOK` with a float `PRICE` that must stay below 10 and an `ID` attribute.
pub fn book_prototype() -> PrototypeRef {
    ElementType::new("book")
        .expects(Expected::new("author", ValueType::STRING))
        .unwrap()
        .expects(Expected::new("title", ValueType::STRING))
        .unwrap()
        .expects(
            Expected::new("price", ValueType::FLOAT).validate(|value: &Value| {
                match value.as_float() {
                    Some(price) if price < 10.0 => Verdict::Accept,
                    _ => Verdict::RejectWith("Should be cheaper than 10".to_string()),
                }
            }),
        )
        .unwrap()
        .expects(Expected::attribute("id", ValueType::STRING))
        .unwrap()
        .into_ref()
}

/// `CATALOG` collecting every `BOOK` into an array field.
pub fn catalog_prototype() -> PrototypeRef {
    ElementType::new("catalog")
        .expects(
            Expected::new("book", ValueType::Array(Scalar::Untyped))
                .prototype(book_prototype())
                .unwrap(),
        )
        .unwrap()
        .into_ref()
}

/// Splits `input` into chunks of `size` bytes, ignoring char boundaries.
pub fn byte_chunks(input: &str, size: usize) -> Vec<&[u8]> {
    input.as_bytes().chunks(size).collect()
}
