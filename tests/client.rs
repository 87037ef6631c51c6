//! Library-level tests driving `Client` through a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, RgbImage};
use serde_json::{json, Value};
use starrysky::extensions::{
    ControlNetInterface, InstructPix2PixRequest, LegacyTxt2ImgRequest, ModelKeywordInterface,
};
use starrysky::ports::{ExecuteFuture, Method, Transport, WireRequest, WireResponse};
use starrysky::{
    BlockingClient, Client, ClientConfig, ClientError, ControlNetUnit, ExtraBatchImagesRequest,
    GenerationOptions, Img2ImgRequest, PngImage, ResultInfo, Txt2ImgRequest,
};

const BASE_URL: &str = "http://127.0.0.1:7860/sdapi/v1";

/// Answers requests from a queue and remembers what was sent.
#[derive(Default)]
struct Scripted {
    responses: Mutex<VecDeque<WireResponse>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl Scripted {
    fn new(responses: Vec<(u16, Value)>) -> Arc<Self> {
        let responses = responses
            .into_iter()
            .map(|(status, body)| WireResponse {
                status,
                body: match body {
                    Value::String(text) => text,
                    other => other.to_string(),
                },
            })
            .collect();
        Arc::new(Self { responses: Mutex::new(responses), requests: Mutex::default() })
    }

    fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for Scripted {
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.responses.lock().unwrap().pop_front();
        Box::pin(async move {
            response.ok_or_else(|| ClientError::Replay("no scripted response left".into()))
        })
    }
}

fn config() -> ClientConfig {
    ClientConfig::new(BASE_URL, "secret")
}

fn scripts(with_controlnet: bool) -> (u16, Value) {
    let mut txt2img = vec![json!("prompt matrix")];
    if with_controlnet {
        txt2img.push(json!("controlnet m2m"));
    }
    (200, json!({ "txt2img": txt2img, "img2img": [] }))
}

fn png_b64(width: u32) -> String {
    let image = DynamicImage::ImageRgb8(RgbImage::new(width, 1));
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
}

fn image() -> PngImage {
    PngImage::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2)))
}

async fn connect(transport: &Arc<Scripted>) -> Client {
    Client::connect_with_transport(&config(), transport.clone()).await.unwrap()
}

#[tokio::test]
async fn session_defaults_reach_the_payload() {
    let transport = Scripted::new(vec![scripts(false), (200, json!({"images": []}))]);
    let config = config().sampler("DPM++ 2M Karras").steps(30);
    let client = Client::connect_with_transport(&config, transport.clone()).await.unwrap();

    client.txt2img(&Txt2ImgRequest::new("a cat")).await.unwrap();

    let sent = transport.requests();
    assert_eq!(sent[1].method, Method::Post);
    assert_eq!(sent[1].url, format!("{BASE_URL}/txt2img"));
    let body = sent[1].body.as_ref().unwrap();
    assert_eq!(body["sampler_name"], "DPM++ 2M Karras");
    assert_eq!(body["steps"], 30);
}

#[tokio::test]
async fn explicit_sampler_beats_session_default() {
    let transport = Scripted::new(vec![scripts(false), (200, json!({"images": []}))]);
    let config = config().sampler("DPM++ 2M Karras");
    let client = Client::connect_with_transport(&config, transport.clone()).await.unwrap();

    client.txt2img(&Txt2ImgRequest::new("a cat").sampler("DDIM").steps(5)).await.unwrap();

    let body = transport.requests()[1].body.clone().unwrap();
    assert_eq!(body["sampler_name"], "DDIM");
    assert_eq!(body["steps"], 5);
}

#[tokio::test]
async fn detected_controlnet_gets_empty_args() {
    let transport = Scripted::new(vec![scripts(true), (200, json!({"images": []}))]);
    let client = connect(&transport).await;
    assert!(client.has_controlnet());

    client.txt2img(&Txt2ImgRequest::new("a cat")).await.unwrap();

    let body = transport.requests()[1].body.clone().unwrap();
    assert_eq!(body["alwayson_scripts"]["ControlNet"]["args"], json!([]));
}

#[tokio::test]
async fn detected_controlnet_gets_empty_args_on_img2img() {
    let transport = Scripted::new(vec![scripts(true), (200, json!({"images": []}))]);
    let client = connect(&transport).await;

    client.img2img(&Img2ImgRequest::new("a cat", vec![image()])).await.unwrap();

    let sent = transport.requests();
    assert_eq!(sent[1].url, format!("{BASE_URL}/img2img"));
    assert_eq!(sent[1].body.as_ref().unwrap()["alwayson_scripts"]["ControlNet"]["args"], json!([]));
}

#[test]
fn blocking_session_gets_empty_args_on_both_endpoints() {
    let transport = Scripted::new(vec![
        scripts(true),
        (200, json!({"images": []})),
        (200, json!({"images": []})),
    ]);
    let client = BlockingClient::connect_with_transport(&config(), transport.clone()).unwrap();

    client.txt2img(&Txt2ImgRequest::new("a cat")).unwrap();
    client.img2img(&Img2ImgRequest::new("a cat", vec![image()])).unwrap();

    let sent = transport.requests();
    assert_eq!(sent[0].url, format!("{BASE_URL}/scripts"));
    for request in &sent[1..] {
        assert_eq!(request.body.as_ref().unwrap()["alwayson_scripts"]["ControlNet"]["args"], json!([]));
    }
}

#[tokio::test]
async fn absent_controlnet_leaves_scripts_alone() {
    let transport = Scripted::new(vec![scripts(false), (200, json!({"images": []}))]);
    let client = connect(&transport).await;
    assert!(!client.has_controlnet());

    client.txt2img(&Txt2ImgRequest::new("a cat")).await.unwrap();

    let body = transport.requests()[1].body.clone().unwrap();
    assert!(body["alwayson_scripts"].get("ControlNet").is_none());
}

#[tokio::test]
async fn controlnet_units_are_serialized() {
    let transport = Scripted::new(vec![scripts(true), (200, json!({"images": []}))]);
    let client = connect(&transport).await;
    let unit = ControlNetUnit::new().input_image(image()).module("canny").model("control_canny");

    client.txt2img(&Txt2ImgRequest::new("a cat").controlnet_unit(unit)).await.unwrap();

    let body = transport.requests()[1].body.clone().unwrap();
    let args = body["alwayson_scripts"]["ControlNet"]["args"].as_array().unwrap();
    assert_eq!(args.len(), 1);
    assert_eq!(args[0]["module"], "canny");
    // ControlNet takes bare base64, not data URIs.
    let input = args[0]["input_image"].as_str().unwrap();
    assert!(!input.is_empty());
    assert!(!input.starts_with("data:"));
}

#[tokio::test]
async fn failed_probe_assumes_no_controlnet() {
    let transport = Scripted::new(vec![(500, json!("boom"))]);
    let client = connect(&transport).await;
    assert!(!client.has_controlnet());
}

#[tokio::test]
async fn batch_name_mismatch_sends_nothing() {
    let transport = Scripted::new(vec![scripts(false)]);
    let client = connect(&transport).await;

    let request = ExtraBatchImagesRequest::new(vec![image(), image()]).names(vec!["only-one".into()]);
    let err = client.extra_batch_images(&request).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(transport.requests().len(), 1, "only the probe should have been sent");
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let transport = Scripted::new(vec![scripts(false), (500, json!("internal error"))]);
    let client = connect(&transport).await;

    let err = client.txt2img(&Txt2ImgRequest::new("a cat")).await.unwrap_err();

    match err {
        ClientError::Service { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn decodes_images_and_json_info() {
    let transport = Scripted::new(vec![
        scripts(false),
        (200, json!({"images": [png_b64(1), png_b64(2)], "parameters": {"prompt": "a cat"}, "info": "{\"seed\": 7}"})),
    ]);
    let client = connect(&transport).await;

    let result = client.txt2img(&Txt2ImgRequest::new("a cat").batch_size(2)).await.unwrap();

    assert_eq!(result.images().len(), 2);
    assert_eq!(result.images()[1].pixels().width(), 2);
    assert_eq!(result.image().unwrap().pixels().width(), 1);
    assert_eq!(result.info(), &ResultInfo::Json(json!({"seed": 7})));
    assert_eq!(result.parameters(), Some(&json!({"prompt": "a cat"})));
}

#[tokio::test]
async fn interrogate_returns_caption() {
    let transport = Scripted::new(vec![scripts(false), (200, json!({"caption": "a cat on a mat"}))]);
    let client = connect(&transport).await;

    let result = client.interrogate(&image()).await.unwrap();

    assert!(result.images().is_empty());
    assert_eq!(result.info().as_text(), Some("a cat on a mat"));
    let sent = transport.requests();
    assert_eq!(sent[1].url, format!("{BASE_URL}/interrogate"));
    assert!(sent[1].body.as_ref().unwrap()["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn set_model_picks_closest_title() {
    let transport = Scripted::new(vec![
        scripts(false),
        (
            200,
            json!([
                {"title": "v1-5-pruned-emaonly.safetensors [6ce0161689]"},
                {"title": "anything-v4.5.safetensors [a1b2c3d4e5]"},
            ]),
        ),
        (200, json!(null)),
    ]);
    let client = connect(&transport).await;

    let found = client.set_model("Anything v4", true).await.unwrap();

    assert_eq!(found.as_deref(), Some("anything-v4.5.safetensors [a1b2c3d4e5]"));
    let sent = transport.requests();
    assert_eq!(sent[2].url, format!("{BASE_URL}/options"));
    assert_eq!(
        sent[2].body.as_ref().unwrap()["sd_model_checkpoint"],
        "anything-v4.5.safetensors [a1b2c3d4e5]"
    );
}

#[tokio::test]
async fn set_model_without_match_sends_no_options() {
    let transport =
        Scripted::new(vec![scripts(false), (200, json!([{"title": "deliberate_v2.safetensors"}]))]);
    let client = connect(&transport).await;

    assert_eq!(client.set_model("anything", false).await.unwrap(), None);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn wait_until_idle_times_out() {
    let busy = json!({"progress": 0.3, "state": {"job_count": 1}});
    let transport = Scripted::new(vec![scripts(false), (200, busy.clone()), (200, busy)]);
    let client = connect(&transport).await;

    let err = client.wait_until_idle(Duration::ZERO, 2).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidResponse(_)));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn wait_until_idle_rejects_zero_polls() {
    let transport = Scripted::new(vec![scripts(false)]);
    let client = connect(&transport).await;

    let err = client.wait_until_idle(Duration::ZERO, 0).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn submitted_request_resolves_later() {
    let transport = Scripted::new(vec![scripts(false), (200, json!({"images": [png_b64(3)]}))]);
    let client = connect(&transport).await;

    let pending = client.submit_txt2img(&Txt2ImgRequest::new("a cat")).unwrap();
    let result = pending.await.unwrap();

    assert_eq!(result.image().unwrap().pixels().width(), 3);
}

#[tokio::test]
async fn submit_validates_before_spawning() {
    let transport = Scripted::new(vec![scripts(false)]);
    let client = connect(&transport).await;

    let err = client.submit_txt2img(&Txt2ImgRequest::new("a cat").size(0, 512)).unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn endpoints_resolve_against_base_or_host() {
    let client = connect(&Scripted::new(vec![scripts(false)])).await;

    assert_eq!(client.resolve_endpoint("txt2img", true), format!("{BASE_URL}/txt2img"));
    assert_eq!(
        client.resolve_endpoint("controlnet/version", false),
        "http://127.0.0.1:7860/controlnet/version"
    );
}

#[tokio::test]
async fn extension_routes_hit_the_host_root() {
    let transport = Scripted::new(vec![
        scripts(true),
        (200, json!({"version": 2})),
        (200, json!({"keywords": ["mdjrny-v4 style"], "model": "mj", "hash": "5d5ad06c", "match_source": "model-keyword.txt"})),
    ]);
    let client = connect(&transport).await;

    let version = ControlNetInterface::new(&client, false).version().await.unwrap();
    let keywords = ModelKeywordInterface::new(&client).get_keywords().await.unwrap();

    assert_eq!(version, json!(2));
    assert_eq!(keywords.oldhash, "5d5ad06c");
    let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls[1], "http://127.0.0.1:7860/controlnet/version");
    assert_eq!(urls[2], "http://127.0.0.1:7860/model_keyword/get_keywords");
}

#[test]
fn blocking_client_mirrors_async_calls() {
    let transport = Scripted::new(vec![
        scripts(true),
        (200, json!({"images": [png_b64(1)], "info": "not json"})),
        (200, json!({"sd_model_checkpoint": "deliberate_v2.safetensors"})),
    ]);
    let client = BlockingClient::connect_with_transport(&config(), transport.clone()).unwrap();
    assert!(client.has_controlnet());

    let result = client.txt2img(&Txt2ImgRequest::new("a cat")).unwrap();
    assert_eq!(result.images().len(), 1);
    assert_eq!(result.info(), &ResultInfo::Text("not json".into()));

    assert_eq!(client.current_model().unwrap(), "deliberate_v2.safetensors");
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn empty_token_fails_before_probing() {
    let transport = Scripted::new(vec![scripts(true)]);

    let err = Client::connect_with_transport(&ClientConfig::new(BASE_URL, ""), transport.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Config(_)));
    assert!(transport.requests().is_empty());
}

#[test]
fn blocking_extension_calls() {
    let transport = Scripted::new(vec![
        scripts(true),
        (200, json!({"model_list": ["control_canny [e3fe7712]"]})),
        (200, json!({"images": [png_b64(1)], "info": "annotated"})),
        (200, json!({"keywords": ["mdjrny-v4 style"], "model": "mj", "hash": "5d5ad06c", "match_source": "model-keyword.txt"})),
        (200, json!({"images": [png_b64(2)]})),
    ]);
    let client = BlockingClient::connect_with_transport(&config(), transport.clone()).unwrap();

    let controlnet = client.controlnet(false);
    assert_eq!(controlnet.model_list().unwrap(), vec!["control_canny [e3fe7712]"]);
    let legacy = controlnet.txt2img(&LegacyTxt2ImgRequest::new("a cat")).unwrap();
    assert_eq!(legacy.info().as_text(), Some("annotated"));

    assert_eq!(client.model_keyword().get_keywords().unwrap().oldhash, "5d5ad06c");

    let edited = client
        .instruct_pix2pix()
        .img2img(&InstructPix2PixRequest::new("make it snowy", vec![image()]))
        .unwrap();
    assert_eq!(edited.image().unwrap().pixels().width(), 2);

    let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls[1..],
        [
            "http://127.0.0.1:7860/controlnet/model_list",
            "http://127.0.0.1:7860/controlnet/txt2img",
            "http://127.0.0.1:7860/model_keyword/get_keywords",
            "http://127.0.0.1:7860/instruct-pix2pix/img2img",
        ]
    );
}
