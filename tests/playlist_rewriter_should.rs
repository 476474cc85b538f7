use tvproxy::server::utils::header_utils::HeaderOverrides;
use tvproxy::server::utils::playlist_utils::{PayloadKind, PlaylistRewriter};
use url::Url;

const BASE: &str = "https://tv.example.test";

fn source() -> Url {
    Url::parse("https://example.test/live/playlist.m3u8").unwrap()
}

#[test]
fn rewrite_relative_segments_through_the_proxy() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "#EXTM3U\n#EXTINF:10,\nsegment1.ts\n";

    let out = rewriter.rewrite(body, &source());

    assert_eq!(
        out,
        "#EXTM3U\n#EXTINF:10,\nhttps://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Flive%2Fsegment1.ts\n"
    );
}

#[test]
fn resolve_against_the_playlist_directory() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let source = Url::parse("https://example.test/live.m3u8").unwrap();

    assert_eq!(
        rewriter.rewrite("segment1.ts", &source),
        "https://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Fsegment1.ts"
    );
}

#[test]
fn resolve_root_relative_and_protocol_relative_lines() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "/other/seg.ts\n//cdn.example.test/seg.ts\nhttps://abs.example.test/seg.ts";

    let out = rewriter.rewrite(body, &source());
    let lines: Vec<&str> = out.split('\n').collect();

    assert_eq!(
        lines,
        vec![
            "https://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Fother%2Fseg.ts",
            "https://tv.example.test/proxy/https%3A%2F%2Fcdn.example.test%2Fseg.ts",
            "https://tv.example.test/proxy/https%3A%2F%2Fabs.example.test%2Fseg.ts",
        ]
    );
}

#[test]
fn leave_tags_comments_and_blank_lines_alone() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "#EXTM3U\n\n# a comment\n#EXT-X-TARGETDURATION:6\n   \n";

    assert_eq!(rewriter.rewrite(body, &source()), body);
}

#[test]
fn be_idempotent() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "#EXTM3U\n#EXTINF:6,\nchunk_001.ts\n#EXTINF:6,\nchunk_002.ts\n";

    let once = rewriter.rewrite(body, &source());
    let twice = rewriter.rewrite(&once, &source());

    assert_eq!(once, twice);
}

#[test]
fn keep_crlf_line_endings() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "#EXTM3U\r\n#EXTINF:10,\r\nsegment1.ts\r\n";

    let out = rewriter.rewrite(body, &source());

    assert_eq!(
        out,
        "#EXTM3U\r\n#EXTINF:10,\r\nhttps://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Flive%2Fsegment1.ts\r\n"
    );
}

#[test]
fn pass_unresolvable_lines_through() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "#EXTM3U\nhttp://[::1/broken.ts\ngood.ts";

    let out = rewriter.rewrite(body, &source());
    let lines: Vec<&str> = out.split('\n').collect();

    assert_eq!(lines[1], "http://[::1/broken.ts");
    assert_eq!(
        lines[2],
        "https://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Flive%2Fgood.ts"
    );
}

#[test]
fn leave_non_http_references_alone() {
    let rewriter = PlaylistRewriter::new(BASE, &HeaderOverrides::default());
    let body = "data:text/plain,hello";

    assert_eq!(rewriter.rewrite(body, &source()), body);
}

#[test]
fn carry_header_overrides_onto_every_link() {
    let overrides = HeaderOverrides::parse(r#"{"Referer":"https://example.test/"}"#).unwrap();
    let rewriter = PlaylistRewriter::new(BASE, &overrides);

    let out = rewriter.rewrite("segment1.ts", &source());

    let (link, query) = out.split_once("?headers=").unwrap();
    assert_eq!(
        link,
        "https://tv.example.test/proxy/https%3A%2F%2Fexample.test%2Flive%2Fsegment1.ts"
    );
    assert_eq!(
        urlencoding::decode(query).unwrap(),
        r#"{"Referer":"https://example.test/"}"#
    );
}

#[test]
fn classify_by_content_type_before_suffix() {
    let ts = Url::parse("https://example.test/seg.ts").unwrap();
    let m3u8 = Url::parse("https://example.test/live.m3u8").unwrap();
    let other = Url::parse("https://example.test/key.bin").unwrap();

    assert_eq!(
        PayloadKind::classify(Some("application/vnd.apple.mpegurl"), &[&ts]),
        PayloadKind::Playlist
    );
    assert_eq!(
        PayloadKind::classify(Some("text/plain"), &[&m3u8]),
        PayloadKind::Playlist
    );
    assert_eq!(PayloadKind::classify(None, &[&ts]), PayloadKind::Segment);
    assert_eq!(
        PayloadKind::classify(Some("application/octet-stream"), &[&other]),
        PayloadKind::Other
    );
    assert!(!PayloadKind::Other.is_live());
}
