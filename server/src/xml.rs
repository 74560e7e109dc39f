//! Callback XML Codec
//!
//! Parses the platform's callback envelope and message bodies into the
//! typed model, and renders outbound replies back to the wire format. The
//! wire format is a flat `<xml>` document of CDATA-wrapped elements.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use wx_common::{EventKind, InboundMessage, MessageKind, OutboundMessage};
use wx_crypto::EncryptedEnvelope;

/// XML layer errors.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Missing required element <{0}>")]
    MissingField(&'static str),

    #[error("Malformed value in element <{0}>")]
    BadField(&'static str),

    /// The message parsed cleanly but its kind (or event subtype) is not
    /// part of the supported closed set.
    #[error("Unsupported message kind: {0}")]
    UnsupportedMessageKind(String),
}

/// Collect the text/CDATA content of every direct child of the root element.
///
/// The callback format never nests, so a flat element-to-text map is a
/// faithful view of the document.
fn parse_fields(xml: &str) -> Result<HashMap<String, String>, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = HashMap::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    current = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Empty(e)) => {
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    fields.entry(name).or_insert_with(String::new);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(name) = &current {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    fields
                        .entry(name.clone())
                        .or_insert_with(String::new)
                        .push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(name) = &current {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    fields
                        .entry(name.clone())
                        .or_insert_with(String::new)
                        .push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Malformed(e.to_string())),
        }
    }

    Ok(fields)
}

fn required<'a>(
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, XmlError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(XmlError::MissingField(name))
}

/// Extract the base64 ciphertext from an inbound callback envelope.
pub fn parse_envelope(body: &str) -> Result<String, XmlError> {
    let fields = parse_fields(body)?;
    required(&fields, "Encrypt").map(ToString::to_string)
}

/// Render an encrypted reply as the outbound envelope XML.
#[must_use]
pub fn render_envelope(envelope: &EncryptedEnvelope) -> String {
    format!(
        "<xml>\
         <Encrypt><![CDATA[{}]]></Encrypt>\
         <MsgSignature><![CDATA[{}]]></MsgSignature>\
         <TimeStamp>{}</TimeStamp>\
         <Nonce><![CDATA[{}]]></Nonce>\
         </xml>",
        envelope.encrypt, envelope.signature, envelope.timestamp, envelope.nonce
    )
}

/// Parse a decrypted message body into the typed model.
///
/// Unknown `MsgType` or `Event` values yield
/// [`XmlError::UnsupportedMessageKind`] - the closed variant set is a
/// deliberate contract, not an oversight.
pub fn parse_message(xml: &str) -> Result<InboundMessage, XmlError> {
    let fields = parse_fields(xml)?;

    let msg_type = required(&fields, "MsgType")?;
    let kind = match msg_type {
        "text" => MessageKind::Text {
            content: required(&fields, "Content")?.to_string(),
        },
        "image" => MessageKind::Image {
            pic_url: required(&fields, "PicUrl")?.to_string(),
            media_id: required(&fields, "MediaId")?.to_string(),
        },
        "voice" => MessageKind::Voice {
            media_id: required(&fields, "MediaId")?.to_string(),
            format: fields.get("Format").cloned().unwrap_or_default(),
        },
        "link" => MessageKind::Link {
            title: fields.get("Title").cloned().unwrap_or_default(),
            description: fields.get("Description").cloned().unwrap_or_default(),
            url: required(&fields, "Url")?.to_string(),
        },
        "event" => {
            let event = match required(&fields, "Event")?.to_ascii_lowercase().as_str() {
                "subscribe" => EventKind::Subscribe,
                "unsubscribe" => EventKind::Unsubscribe,
                "click" => EventKind::Click,
                "view" => EventKind::View,
                "scan" => EventKind::Scan,
                "location" => EventKind::Location,
                other => return Err(XmlError::UnsupportedMessageKind(format!("event:{other}"))),
            };
            MessageKind::Event {
                event,
                event_key: fields.get("EventKey").filter(|k| !k.is_empty()).cloned(),
            }
        }
        other => return Err(XmlError::UnsupportedMessageKind(other.to_string())),
    };

    let create_time = required(&fields, "CreateTime")?
        .parse::<i64>()
        .map_err(|_| XmlError::BadField("CreateTime"))?;
    let msg_id = fields
        .get("MsgId")
        .map(|v| v.parse::<i64>().map_err(|_| XmlError::BadField("MsgId")))
        .transpose()?;

    Ok(InboundMessage {
        from_user: required(&fields, "FromUserName")?.to_string(),
        to_user: required(&fields, "ToUserName")?.to_string(),
        create_time,
        msg_id,
        kind,
    })
}

/// Render an outbound reply as plaintext message XML, ready for encryption.
#[must_use]
pub fn render_message(msg: &OutboundMessage) -> String {
    let create_time = chrono::Utc::now().timestamp();
    match msg {
        OutboundMessage::Text {
            from_user,
            to_user,
            content,
        } => format!(
            "<xml>\
             <ToUserName><![CDATA[{to_user}]]></ToUserName>\
             <FromUserName><![CDATA[{from_user}]]></FromUserName>\
             <CreateTime>{create_time}</CreateTime>\
             <MsgType><![CDATA[text]]></MsgType>\
             <Content><![CDATA[{content}]]></Content>\
             </xml>"
        ),
        OutboundMessage::Image {
            from_user,
            to_user,
            media_id,
        } => format!(
            "<xml>\
             <ToUserName><![CDATA[{to_user}]]></ToUserName>\
             <FromUserName><![CDATA[{from_user}]]></FromUserName>\
             <CreateTime>{create_time}</CreateTime>\
             <MsgType><![CDATA[image]]></MsgType>\
             <Image><MediaId><![CDATA[{media_id}]]></MediaId></Image>\
             </xml>"
        ),
        OutboundMessage::Voice {
            from_user,
            to_user,
            media_id,
        } => format!(
            "<xml>\
             <ToUserName><![CDATA[{to_user}]]></ToUserName>\
             <FromUserName><![CDATA[{from_user}]]></FromUserName>\
             <CreateTime>{create_time}</CreateTime>\
             <MsgType><![CDATA[voice]]></MsgType>\
             <Voice><MediaId><![CDATA[{media_id}]]></MediaId></Voice>\
             </xml>"
        ),
    }
}
