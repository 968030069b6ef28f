use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use castitdiscovery::ssdp::MEDIA_RENDERER_TARGET;
use castitdiscovery::{
    DescriptionError, DescriptionFetcher, DriverState, RendererEvent, SsdpDiscovery, SsdpSettings,
};

const LOCATION: &str = "http://192.168.1.50:8080/desc.xml";

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>LivingRoomTV</friendlyName>
    <modelName>TV-9000</modelName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/ctl</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

/// Sert une description fixe, après un délai éventuel
struct FakeFetcher {
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

impl DescriptionFetcher for FakeFetcher {
    fn fetch(&self, location: &str) -> Result<String, DescriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if location == LOCATION {
            Ok(DESCRIPTION.to_string())
        } else {
            Err(DescriptionError::Http {
                url: location.to_string(),
                message: "HTTP 404".to_string(),
            })
        }
    }
}

/// Faux renderer : compte les M-SEARCH reçus et répond à chacun.
fn spawn_renderer(listen_for: Duration) -> (SocketAddrV4, thread::JoinHandle<usize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = match socket.local_addr().unwrap() {
        std::net::SocketAddr::V4(addr) => addr,
        other => panic!("unexpected address {other}"),
    };
    socket
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();

    let handle = thread::spawn(move || {
        let deadline = Instant::now() + listen_for;
        let mut searches = 0;
        let mut buf = [0u8; 2048];
        while Instant::now() < deadline {
            let Ok((len, from)) = socket.recv_from(&mut buf) else {
                continue;
            };
            let text = String::from_utf8_lossy(&buf[..len]);
            if !text.starts_with("M-SEARCH * HTTP/1.1") {
                continue;
            }
            assert!(text.contains("MAN: \"ssdp:discover\""));
            assert!(text.contains(&format!("ST: {MEDIA_RENDERER_TARGET}")));
            searches += 1;
            let response = format!(
                "HTTP/1.1 200 OK\r\n\
                 CACHE-CONTROL: max-age=1800\r\n\
                 Location: {LOCATION}\r\n\
                 ST: {MEDIA_RENDERER_TARGET}\r\n\
                 USN: uuid:1234::{MEDIA_RENDERER_TARGET}\r\n\r\n"
            );
            socket.send_to(response.as_bytes(), from).unwrap();
        }
        searches
    });
    (addr, handle)
}

fn settings(group: SocketAddrV4, max_searches: u32) -> SsdpSettings {
    SsdpSettings {
        search_interval: Duration::from_millis(50),
        max_searches,
        group,
        ..SsdpSettings::default()
    }
}

#[test]
fn test_renderer_discovered_from_response() {
    let (group, renderer) = spawn_renderer(Duration::from_millis(800));
    let fetcher = FakeFetcher::new(Duration::ZERO);
    let mut ssdp = SsdpDiscovery::new(settings(group, 3), fetcher.clone());
    let events = ssdp.subscribe();
    ssdp.start().unwrap();
    assert_eq!(ssdp.state(), DriverState::Listening);

    let first = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(
        first,
        RendererEvent::RenderersUpdated(vec!["LivingRoomTV".to_string()])
    );
    let RendererEvent::RendererUrlsUpdated(urls) =
        events.recv_timeout(Duration::from_secs(2)).unwrap()
    else {
        panic!("expected RendererUrlsUpdated");
    };
    assert_eq!(urls["LivingRoomTV"], "http://192.168.1.50:8080/ctl");

    // Les M-SEARCH s'arrêtent au plafond ; la description n'est lue qu'une fois
    assert_eq!(renderer.join().unwrap(), 3);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());

    ssdp.stop();
    assert_eq!(ssdp.state(), DriverState::Stopped);
}

#[test]
fn test_stop_discards_in_flight_descriptions() {
    let (group, renderer) = spawn_renderer(Duration::from_millis(300));
    let fetcher = FakeFetcher::new(Duration::from_millis(400));
    let mut ssdp = SsdpDiscovery::new(settings(group, 1), fetcher.clone());
    let events = ssdp.subscribe();
    ssdp.start().unwrap();

    // Le temps que la réponse arrive et que la récupération démarre
    let deadline = Instant::now() + Duration::from_secs(2);
    while fetcher.calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    ssdp.stop();
    ssdp.stop();

    assert!(events.recv_timeout(Duration::from_millis(600)).is_err());
    assert_eq!(renderer.join().unwrap(), 1);
}

#[test]
fn test_zero_searches_keeps_socket_open() {
    let group = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
    let mut ssdp = SsdpDiscovery::new(settings(group, 0), FakeFetcher::new(Duration::ZERO));
    ssdp.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(ssdp.state(), DriverState::Listening);
}
