//! HttpDetector against a loopback detection server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};

use grid_locator::{
    BoxDetector, Frame, GridGeometry, GridLocalizer, HttpDetector, HttpDetectorConfig,
};

struct CapturedRequest {
    request_line: String,
    content_type: String,
    body: Vec<u8>,
}

/// Serve exactly one request with the given status line and JSON reply,
/// handing back what the client sent.
fn serve_once(
    status: &'static str,
    reply: &'static str,
) -> (String, thread::JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let endpoint = format!("http://{}/predict", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut content_length = 0usize;
        let mut content_type = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap(),
                    "content-type" => content_type = value.trim().to_string(),
                    _ => {}
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();

        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reply.len(),
            reply
        )
        .unwrap();
        stream.flush().unwrap();

        CapturedRequest {
            request_line,
            content_type,
            body,
        }
    });
    (endpoint, handle)
}

fn detector_for(endpoint: String) -> HttpDetector {
    HttpDetector::new(HttpDetectorConfig {
        endpoint,
        timeout: Some(Duration::from_secs(10)),
        ..HttpDetectorConfig::default()
    })
}

fn grid_frame() -> Frame {
    Frame::from_image(RgbImage::from_pixel(610, 590, Rgb([30, 30, 30])))
}

#[test]
fn posts_prompt_and_jpeg_and_parses_first_box() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"[{"boxes": [[0.83, 0.69, 1.0, 0.99]], "scores": [0.88], "labels": ["Turtlebot3"]}]"#,
    );
    let mut detector = detector_for(endpoint);

    let bbox = detector.detect(&grid_frame()).expect("detection");
    assert_eq!(bbox.to_array(), [0.83, 0.69, 1.0, 0.99]);

    let grid = GridLocalizer::new(GridGeometry::default()).unwrap();
    assert_eq!(grid.locate_normalized(bbox).unwrap().to_string(), "(4,5)");

    let request = server.join().unwrap();
    assert!(request.request_line.starts_with("POST /predict "));
    let boundary = request
        .content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type")
        .to_string();

    let body = String::from_utf8_lossy(&request.body);
    assert!(body.starts_with(&format!("--{}\r\n", boundary)));
    assert!(body.contains("name=\"prompt\"\r\n\r\nTurtlebot3\r\n"));
    assert!(body.contains("name=\"file\"; filename=\"image.jpg\""));
    assert!(body.contains("Content-Type: image/jpeg\r\n\r\n"));
    assert!(body.ends_with(&format!("--{}--\r\n", boundary)));

    // The file part carries a decodable JPEG of the frame.
    let marker = b"Content-Type: image/jpeg\r\n\r\n";
    let start = request
        .body
        .windows(marker.len())
        .position(|w| w == marker)
        .unwrap()
        + marker.len();
    let jpeg = &request.body[start..];
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(jpeg).expect("jpeg payload");
    assert_eq!((decoded.width(), decoded.height()), (610, 590));
}

#[test]
fn custom_prompt_is_sent() {
    let (endpoint, server) = serve_once("200 OK", r#"[{"boxes": [[0.1, 0.1, 0.2, 0.2]]}]"#);
    let mut detector = HttpDetector::new(HttpDetectorConfig {
        endpoint,
        prompt: "red cube".to_string(),
        timeout: Some(Duration::from_secs(10)),
        ..HttpDetectorConfig::default()
    });
    detector.detect(&grid_frame()).unwrap();

    let request = server.join().unwrap();
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"prompt\"\r\n\r\nred cube\r\n"));
}

#[test]
fn non_success_status_is_service_error() {
    let (endpoint, server) = serve_once("500 Internal Server Error", r#"{"error": "model offline"}"#);
    let mut detector = detector_for(endpoint);

    let err = detector.detect(&grid_frame()).unwrap_err();
    assert_eq!(err.kind(), "detection_service");
    assert!(err.to_string().contains("500"), "{}", err);
    server.join().unwrap();
}

#[test]
fn malformed_and_empty_replies_are_service_errors() {
    for reply in [
        "not json",
        "[]",
        r#"[{"boxes": []}]"#,
        r#"[{"boxes": [[0.1, 0.2, 0.3]]}]"#,
        r#"{"boxes": [[0.1, 0.2, 0.3, 0.4]]}"#,
    ] {
        let (endpoint, server) = serve_once("200 OK", reply);
        let mut detector = detector_for(endpoint);
        let err = detector.detect(&grid_frame()).unwrap_err();
        assert_eq!(err.kind(), "detection_service", "reply {}", reply);
        server.join().unwrap();
    }
}
