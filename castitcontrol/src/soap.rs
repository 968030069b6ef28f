//! Client SOAP UPnP minimal : construction de l'enveloppe, POST, lecture
//! des fautes.

use std::time::Duration;

use tracing::debug;
use ureq::Agent;
use xmltree::{Element, XMLNode};

use crate::errors::ControlError;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Construit l'enveloppe d'une requête SOAP UPnP
///
/// ```
/// let xml = castitcontrol::soap::build_soap_request(
///     "urn:schemas-upnp-org:service:AVTransport:1",
///     "Play",
///     &[("InstanceID", "0"), ("Speed", "1")],
/// ).unwrap();
/// assert!(xml.contains("<Speed>1</Speed>"));
/// ```
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, ControlError> {
    let mut request_elem = Element::new(&format!("u:{}", action));
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text((*value).to_string()));
        request_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(request_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    String::from_utf8(buf).map_err(|e| ControlError::Xml(e.to_string()))
}

/// Faute SOAP, avec le détail UPnP quand il est présent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub fault_code: Option<String>,
    pub fault_string: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

/// Extrait la faute d'une réponse SOAP ; `None` si le corps n'en contient
/// pas (ou n'est pas du XML).
pub fn parse_fault(body: &str) -> Option<SoapFault> {
    let root = Element::parse(body.as_bytes()).ok()?;
    let fault = find_descendant(&root, "Fault")?;
    let upnp = find_descendant(fault, "UPnPError");
    Some(SoapFault {
        fault_code: child_text(fault, "faultcode"),
        fault_string: child_text(fault, "faultstring"),
        error_code: upnp.and_then(|e| child_text(e, "errorCode")),
        error_description: upnp.and_then(|e| child_text(e, "errorDescription")),
    })
}

fn find_descendant<'a>(elem: &'a Element, name: &str) -> Option<&'a Element> {
    elem.children
        .iter()
        .filter_map(XMLNode::as_element)
        .find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                find_descendant(child, name)
            }
        })
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|child| child.get_text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Réponse HTTP 2xx d'une action
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

pub struct SoapClient {
    agent: Agent,
}

impl SoapClient {
    pub fn new(timeout: Duration) -> Self {
        // Les statuts 4xx/5xx ne sont pas des erreurs de transport : le corps
        // d'une faute SOAP doit rester lisible.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    /// POST d'une action sur `control_url`
    pub fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<SoapResponse, ControlError> {
        let body_xml = build_soap_request(service_type, action, args)?;
        let soap_action_header = format!(r#""{}#{}""#, service_type, action);
        debug!("SOAP {} -> {}", action, control_url);

        let http_error = |message: String| ControlError::Http {
            url: control_url.to_string(),
            message,
        };

        let mut response = self
            .agent
            .post(control_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", &soap_action_header)
            .send(body_xml)
            .map_err(|e| http_error(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| http_error(e.to_string()))?;

        if (200..300).contains(&status) {
            return Ok(SoapResponse { status, body });
        }

        match parse_fault(&body) {
            Some(SoapFault {
                error_code: Some(code),
                error_description,
                fault_string,
                ..
            }) => Err(ControlError::SoapFault {
                action: action.to_string(),
                status,
                code,
                description: error_description.or(fault_string).unwrap_or_default(),
            }),
            _ => Err(ControlError::Soap {
                action: action.to_string(),
                status,
                body,
            }),
        }
    }
}
