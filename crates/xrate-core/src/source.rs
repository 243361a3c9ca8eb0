use std::num::ParseFloatError;

use url::form_urlencoded;

use crate::document::NodeSelector;
use crate::traits::ExchangeSource;

const XE_CONVERTER_URL: &str = "http://www.xe.com/currencyconverter/convert/";

/// The xe.com currency converter page.
///
/// The rate sits in the first `<td class="rightCol">` cell, followed by a
/// non-breaking space.
#[derive(Debug, Clone, Copy, Default)]
pub struct XeCom;

impl ExchangeSource for XeCom {
    fn name(&self) -> &str {
        "xe-com"
    }

    fn build_url(&self, from: &str, to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("Amount", "1")
            .append_pair("From", from)
            .append_pair("To", to)
            .append_pair("r", "")
            .finish();
        format!("{XE_CONVERTER_URL}?{query}#converter")
    }

    fn selector(&self) -> NodeSelector {
        NodeSelector::element("td")
            .with_attribute("class", "rightCol")
            .at(0)
    }

    fn parse_rate(&self, text: &str) -> Result<f64, ParseFloatError> {
        text.trim_matches(|c: char| c == '\u{a0}' || c.is_ascii_whitespace())
            .parse()
    }
}
