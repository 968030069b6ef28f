//! Description UPnP d'un renderer (`description.xml`).
//!
//! Seuls les champs utiles au pilotage sont retenus : identité, nom
//! affichable et liste des services avec leur URL de contrôle absolue.

use std::time::Duration;

use tracing::debug;
use ureq::Agent;
use url::Url;
use xmltree::{Element, XMLNode};

use crate::USER_AGENT;
use crate::errors::DescriptionError;

/// Service déclaré dans `<serviceList>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service_type: String,
    /// URL de contrôle, résolue contre l'URL de la description
    pub control_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub udn: Option<String>,
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
    pub model_name: Option<String>,
    pub manufacturer: Option<String>,
    /// `URLBase` tel que déclaré ; informatif, jamais utilisé pour résoudre
    pub url_base: Option<String>,
    /// Services du device racine puis des devices embarqués
    pub services: Vec<ServiceEntry>,
}

impl DeviceDescription {
    /// `friendlyName` s'il est renseigné, sinon `modelName`
    pub fn display_name(&self) -> Option<&str> {
        non_empty(self.friendly_name.as_deref()).or_else(|| non_empty(self.model_name.as_deref()))
    }

    /// Premier service AVTransport
    pub fn avtransport(&self) -> Option<&ServiceEntry> {
        self.services
            .iter()
            .find(|service| service.service_type.contains("AVTransport"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Analyse une description de device.
///
/// `location` est l'URL d'où provient le document ; elle sert de base aux
/// `controlURL` relatives, `URLBase` compris.
pub fn parse_description(xml: &str, location: &str) -> Result<DeviceDescription, DescriptionError> {
    let root = Element::parse(xml.as_bytes()).map_err(|e| DescriptionError::Xml(e.to_string()))?;
    let device = root
        .get_child("device")
        .ok_or(DescriptionError::MissingField("device"))?;

    let base = Url::parse(location).map_err(|source| DescriptionError::Url {
        url: location.to_string(),
        source,
    })?;

    let mut services = Vec::new();
    collect_services(device, &base, &mut services);

    Ok(DeviceDescription {
        udn: child_text(device, "UDN"),
        device_type: child_text(device, "deviceType"),
        friendly_name: child_text(device, "friendlyName"),
        model_name: child_text(device, "modelName"),
        manufacturer: child_text(device, "manufacturer"),
        url_base: child_text(&root, "URLBase"),
        services,
    })
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|child| child.get_text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn child_elements<'a>(elem: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    elem.children.iter().filter_map(move |node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

fn collect_services(device: &Element, base: &Url, out: &mut Vec<ServiceEntry>) {
    if let Some(list) = device.get_child("serviceList") {
        for service in child_elements(list, "service") {
            let (Some(service_type), Some(raw_url)) = (
                child_text(service, "serviceType"),
                child_text(service, "controlURL"),
            ) else {
                continue;
            };
            match base.join(&raw_url) {
                Ok(url) => out.push(ServiceEntry {
                    service_type,
                    control_url: url.to_string(),
                }),
                Err(e) => debug!("Skipping service {}: bad controlURL '{}': {}", service_type, raw_url, e),
            }
        }
    }

    if let Some(list) = device.get_child("deviceList") {
        for embedded in child_elements(list, "device") {
            collect_services(embedded, base, out);
        }
    }
}

/// Source des documents de description
pub trait DescriptionFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<String, DescriptionError>;
}

/// Récupération HTTP (GET) avec délai global.
pub struct HttpDescriptionFetcher {
    agent: Agent,
}

impl HttpDescriptionFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

impl DescriptionFetcher for HttpDescriptionFetcher {
    fn fetch(&self, location: &str) -> Result<String, DescriptionError> {
        debug!("Fetching description at {}", location);
        let http_error = |message: String| DescriptionError::Http {
            url: location.to_string(),
            message,
        };

        let mut response = self
            .agent
            .get(location)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| http_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_error(format!("HTTP {}", status)));
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| http_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    const RENDERER: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>LivingRoomTV</friendlyName>
    <manufacturer>ACME &amp; Co</manufacturer>
    <modelName>TV-9000</modelName>
    <UDN>uuid:1234</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <controlURL>/rc</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/ctl</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    const LOCATION: &str = "http://192.168.1.50:8080/desc.xml";

    #[test]
    fn test_parse_renderer() {
        let desc = parse_description(RENDERER, LOCATION).unwrap();
        assert_eq!(desc.display_name(), Some("LivingRoomTV"));
        assert_eq!(desc.manufacturer.as_deref(), Some("ACME & Co"));
        assert_eq!(desc.udn.as_deref(), Some("uuid:1234"));
        assert_eq!(desc.services.len(), 2);
        assert_eq!(
            desc.avtransport().unwrap().control_url,
            "http://192.168.1.50:8080/ctl"
        );
    }

    #[test]
    fn test_model_name_fallback() {
        let xml = RENDERER.replace("<friendlyName>LivingRoomTV</friendlyName>", "<friendlyName> </friendlyName>");
        let desc = parse_description(&xml, LOCATION).unwrap();
        assert_eq!(desc.display_name(), Some("TV-9000"));
    }

    #[test]
    fn test_relative_paths_follow_location() {
        let xml = RENDERER
            .replace("<specVersion>", "<URLBase>http://10.0.0.9:49152/upnp/</URLBase><specVersion>")
            .replace("<controlURL>/ctl</controlURL>", "<controlURL>control/avt</controlURL>");
        let desc = parse_description(&xml, "http://192.168.1.50:8080/dev/desc.xml").unwrap();
        assert_eq!(desc.url_base.as_deref(), Some("http://10.0.0.9:49152/upnp/"));
        assert_eq!(
            desc.avtransport().unwrap().control_url,
            "http://192.168.1.50:8080/dev/control/avt"
        );
    }

    #[test]
    fn test_embedded_device_services() {
        let xml = r#"<root><device><friendlyName>Box</friendlyName>
            <deviceList><device><serviceList><service>
              <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
              <controlURL>http://10.0.0.2/avt</controlURL>
            </service></serviceList></device></deviceList>
            </device></root>"#;
        let desc = parse_description(xml, LOCATION).unwrap();
        assert_eq!(desc.avtransport().unwrap().control_url, "http://10.0.0.2/avt");
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            parse_description("<root><device>", LOCATION),
            Err(DescriptionError::Xml(_))
        ));
        assert!(matches!(
            parse_description("<root/>", LOCATION),
            Err(DescriptionError::MissingField("device"))
        ));
        assert!(matches!(
            parse_description(RENDERER, "not a url"),
            Err(DescriptionError::Url { .. })
        ));
    }

    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/desc.xml", addr)
    }

    #[test]
    fn test_http_fetch() {
        let location = serve_once("200 OK", RENDERER);
        let fetcher = HttpDescriptionFetcher::new(Duration::from_secs(5));
        let body = fetcher.fetch(&location).unwrap();
        let desc = parse_description(&body, &location).unwrap();
        assert!(desc.avtransport().unwrap().control_url.ends_with("/ctl"));
    }

    #[test]
    fn test_http_fetch_error_status() {
        let location = serve_once("404 Not Found", "");
        let fetcher = HttpDescriptionFetcher::new(Duration::from_secs(5));
        assert!(matches!(
            fetcher.fetch(&location),
            Err(DescriptionError::Http { .. })
        ));
    }
}
