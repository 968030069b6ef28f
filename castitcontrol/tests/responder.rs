mod common;

use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use castitcontrol::{MediaResponder, ResponderSettings};
use tempfile::TempDir;

fn loopback() -> ResponderSettings {
    ResponderSettings {
        bind_address: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        port: 0,
    }
}

fn media(dir: &TempDir, name: &str, len: usize) -> (std::path::PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join(name);
    fs::write(&path, &data).unwrap();
    (path, data)
}

#[test]
fn test_get_serves_whole_file() {
    let dir = TempDir::new().unwrap();
    let (path, data) = media(&dir, "movie.mkv", 300_000);
    let responder = MediaResponder::start(&path, &loopback()).unwrap();
    assert!(responder.url().ends_with("/media/movie.mkv"));

    let response = common::request(responder.local_addr(), "GET", "/media/movie.mkv");
    assert!(response.start_line.starts_with("HTTP/1.1 200"), "{}", response.start_line);
    assert_eq!(response.header("content-type"), Some("video/x-matroska"));
    assert_eq!(response.header("content-length"), Some("300000"));
    assert_eq!(response.body, data);
}

#[test]
fn test_any_path_serves_the_file() {
    let dir = TempDir::new().unwrap();
    let (path, data) = media(&dir, "song.mp3", 1024);
    let responder = MediaResponder::start(&path, &loopback()).unwrap();

    let response = common::request(responder.local_addr(), "GET", "/whatever?x=1");
    assert!(response.start_line.starts_with("HTTP/1.1 200"));
    assert_eq!(response.header("content-type"), Some("audio/mpeg"));
    assert_eq!(response.body, data);
}

#[test]
fn test_head_and_other_methods() {
    let dir = TempDir::new().unwrap();
    let (path, _) = media(&dir, "clip.avi", 2048);
    let responder = MediaResponder::start(&path, &loopback()).unwrap();

    let head = common::request(responder.local_addr(), "HEAD", "/media/clip.avi");
    assert!(head.start_line.starts_with("HTTP/1.1 200"));
    assert_eq!(head.header("content-type"), Some("video/x-msvideo"));
    assert!(head.body.is_empty());

    let post = common::request(responder.local_addr(), "POST", "/media/clip.avi");
    assert!(post.start_line.starts_with("HTTP/1.1 405"), "{}", post.start_line);
}

#[test]
fn test_missing_file_is_404() {
    let dir = TempDir::new().unwrap();
    let (path, _) = media(&dir, "gone.mp4", 16);
    let mut responder = MediaResponder::start(&path, &loopback()).unwrap();
    fs::remove_file(&path).unwrap();

    let response = common::request(responder.local_addr(), "GET", "/media/gone.mp4");
    assert!(response.start_line.starts_with("HTTP/1.1 404"));

    responder.stop();
    assert!(std::net::TcpStream::connect(responder.local_addr()).is_err());
}

#[test]
fn test_busy_port_is_a_bind_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let settings = ResponderSettings {
        port: taken.local_addr().unwrap().port(),
        ..loopback()
    };
    assert!(matches!(
        MediaResponder::start("/tmp/a.mp4", &settings),
        Err(castitcontrol::ControlError::Bind { .. })
    ));
}
