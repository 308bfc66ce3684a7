//! HTML rendering for quote e-mails and the printable quote document.
//!
//! Templates are embedded at build time and registered with an `.html`
//! suffix so Tera auto-escapes every interpolated value.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use quotecraft_core::delivery::{Attachment, DeliveryError, DocumentRenderer, RenderedDocument};
use quotecraft_core::domain::client::Client;
use quotecraft_core::domain::quote::{QuoteDetails, SharedQuoteLine};
use quotecraft_core::pricing::Totals;

const EMAIL_TEMPLATE: &str = "email/quote.html";
const DOCUMENT_TEMPLATE: &str = "document/quote.html";

/// Register custom Tera filters used by quote templates.
///
/// - `money`: fixed two-decimal rendering of an amount, e.g. `totals.total | money`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Amounts arrive as decimal strings (the `rust_decimal` serde form) or numbers.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(raw) => Decimal::from_str(raw)
            .map_err(|error| tera::Error::msg(format!("money filter: `{raw}`: {error}")))?,
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|error| tera::Error::msg(format!("money filter: {error}")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter cannot format {other}"))),
    };
    Ok(tera::Value::String(format!("{:.2}", amount.round_dp(2))))
}

#[derive(Debug, Serialize)]
struct QuoteTemplateData<'a> {
    quote: &'a quotecraft_core::domain::quote::Quote,
    client: &'a Client,
    owner_name: &'a str,
    items: Vec<SharedQuoteLine>,
    totals: Totals,
    notes: Option<&'a str>,
    has_discount: bool,
}

impl<'a> QuoteTemplateData<'a> {
    fn from_details(details: &'a QuoteDetails) -> Self {
        Self {
            quote: &details.quote,
            client: &details.client,
            owner_name: &details.owner_name,
            items: details.items.iter().map(SharedQuoteLine::from).collect(),
            totals: details.totals,
            notes: details.quote.notes.as_deref(),
            has_discount: !details.totals.discount.is_zero(),
        }
    }
}

pub struct QuoteTemplates {
    tera: Tera,
}

impl QuoteTemplates {
    pub fn embedded() -> Result<Self, DeliveryError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_templates(vec![
            (EMAIL_TEMPLATE, include_str!("../../../templates/email/quote.html.tera")),
            (DOCUMENT_TEMPLATE, include_str!("../../../templates/document/quote.html.tera")),
        ])
        .map_err(|error| DeliveryError::Render(error.to_string()))?;

        Ok(Self { tera })
    }

    pub fn email_subject(details: &QuoteDetails) -> String {
        format!("Quote {} for {}", details.quote.quote_number, details.client.name)
    }

    pub fn email_body(&self, details: &QuoteDetails, link: &str) -> Result<String, DeliveryError> {
        let mut context = self.context(details)?;
        context.insert("link", link);
        self.render(EMAIL_TEMPLATE, &context)
    }

    pub fn document(&self, details: &QuoteDetails) -> Result<String, DeliveryError> {
        let context = self.context(details)?;
        self.render(DOCUMENT_TEMPLATE, &context)
    }

    fn context(&self, details: &QuoteDetails) -> Result<Context, DeliveryError> {
        Context::from_serialize(QuoteTemplateData::from_details(details))
            .map_err(|error| DeliveryError::Render(error.to_string()))
    }

    fn render(&self, template: &str, context: &Context) -> Result<String, DeliveryError> {
        self.tera.render(template, context).map_err(|error| DeliveryError::Render(error.to_string()))
    }
}

/// Printable HTML document; browsers print it to PDF.
pub struct HtmlDocumentRenderer {
    templates: QuoteTemplates,
}

impl HtmlDocumentRenderer {
    pub fn new(templates: QuoteTemplates) -> Self {
        Self { templates }
    }
}

impl DocumentRenderer for HtmlDocumentRenderer {
    fn render(&self, details: &QuoteDetails) -> Result<RenderedDocument, DeliveryError> {
        let html = self.templates.document(details)?;
        Ok(Attachment {
            filename: format!("{}.html", details.quote.quote_number),
            content_type: "text/html; charset=utf-8".to_string(),
            bytes: html.into_bytes(),
        })
    }
}
