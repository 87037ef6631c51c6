//! Normalization of the webui's response bodies into one result type.

use serde_json::Value;

use crate::codec::{decode_base64_png, PngImage};
use crate::error::ClientError;

/// The `info` portion of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultInfo {
    /// The response carried no info, html info or caption.
    Empty,
    /// Plain text: `html_info`, `caption`, or an `info` string that is not JSON.
    Text(String),
    /// Parsed JSON from the `info` field.
    Json(Value),
}

impl ResultInfo {
    /// The parsed JSON value, if any.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// The text value, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the response had no info at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A decoded API response: images in server order, raw parameters and info.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    images: Vec<PngImage>,
    parameters: Option<Value>,
    info: ResultInfo,
}

impl GenerationResult {
    /// All decoded images, in the order the server sent them.
    #[must_use]
    pub fn images(&self) -> &[PngImage] {
        &self.images
    }

    /// The first image, which is the canonical output for single-image calls.
    #[must_use]
    pub fn image(&self) -> Option<&PngImage> {
        self.images.first()
    }

    /// The `parameters` field exactly as the server returned it.
    #[must_use]
    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }

    /// Info extracted from `info`, `html_info` or `caption`.
    #[must_use]
    pub fn info(&self) -> &ResultInfo {
        &self.info
    }

    /// Consume the result, returning the decoded images.
    #[must_use]
    pub fn into_images(self) -> Vec<PngImage> {
        self.images
    }

    /// Build a result from an already-parsed JSON body.
    ///
    /// `images` takes precedence over `image`. Info comes from `info`
    /// (parsed as JSON when it is a string that parses), then `html_info`,
    /// then `caption`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if any image fails to decode, and
    /// [`ClientError::InvalidResponse`] if an image field has the wrong shape.
    pub fn from_json(body: &Value) -> Result<Self, ClientError> {
        let images = if let Some(images) = body.get("images") {
            let list = images.as_array().ok_or_else(|| {
                ClientError::InvalidResponse("'images' is not an array".into())
            })?;
            list.iter().map(decode_image_value).collect::<Result<Vec<_>, _>>()?
        } else if let Some(image) = body.get("image") {
            vec![decode_image_value(image)?]
        } else {
            Vec::new()
        };

        let info = if let Some(info) = body.get("info") {
            match info {
                Value::String(raw) => serde_json::from_str::<Value>(raw)
                    .map_or_else(|_| ResultInfo::Text(raw.clone()), ResultInfo::Json),
                other => ResultInfo::Json(other.clone()),
            }
        } else if let Some(html) = body.get("html_info") {
            text_or_json(html)
        } else if let Some(caption) = body.get("caption") {
            text_or_json(caption)
        } else {
            ResultInfo::Empty
        };

        let parameters = body.get("parameters").cloned();

        Ok(Self { images, parameters, info })
    }
}

/// Decode a raw HTTP response into a [`GenerationResult`].
///
/// # Errors
///
/// Returns [`ClientError::Service`] for any status other than 200 without
/// looking at the body, [`ClientError::InvalidResponse`] if the body is not
/// JSON, and any error from [`GenerationResult::from_json`].
pub fn decode_response(status: u16, body: &str) -> Result<GenerationResult, ClientError> {
    if status != 200 {
        return Err(ClientError::Service { status, body: body.to_string() });
    }
    let json: Value = serde_json::from_str(body)
        .map_err(|e| ClientError::InvalidResponse(format!("Response is not JSON: {e}")))?;
    GenerationResult::from_json(&json)
}

fn decode_image_value(value: &Value) -> Result<PngImage, ClientError> {
    let encoded = value
        .as_str()
        .ok_or_else(|| ClientError::InvalidResponse("image entry is not a string".into()))?;
    decode_base64_png(encoded)
}

fn text_or_json(value: &Value) -> ResultInfo {
    match value {
        Value::String(s) => ResultInfo::Text(s.clone()),
        other => ResultInfo::Json(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_raw;
    use image::{DynamicImage, RgbImage};
    use serde_json::json;

    fn b64(width: u32) -> String {
        encode_raw(&PngImage::new(DynamicImage::ImageRgb8(RgbImage::new(width, 1)))).unwrap()
    }

    #[test]
    fn images_with_json_info() {
        let body = json!({"images": [b64(1)], "info": "{\"seed\":1}"}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.images().len(), 1);
        assert_eq!(result.info(), &ResultInfo::Json(json!({"seed": 1})));
        assert!(result.parameters().is_none());
    }

    #[test]
    fn single_image_with_caption() {
        let body = json!({"image": b64(1), "caption": "a cat"}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.images().len(), 1);
        assert_eq!(result.info(), &ResultInfo::Text("a cat".into()));
    }

    #[test]
    fn images_keep_server_order() {
        let body = json!({"images": [b64(1), b64(2), b64(3)]}).to_string();
        let result = decode_response(200, &body).unwrap();
        let widths: Vec<u32> = result.images().iter().map(PngImage::width).collect();
        assert_eq!(widths, vec![1, 2, 3]);
        assert_eq!(result.image().unwrap().width(), 1);
    }

    #[test]
    fn images_field_wins_over_image() {
        let body = json!({"images": [b64(2), b64(3)], "image": b64(1)}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.images().len(), 2);
        assert_eq!(result.image().unwrap().width(), 2);
    }

    #[test]
    fn unparsable_info_is_kept_as_text() {
        let body = json!({"info": "not { json"}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.info().as_text(), Some("not { json"));
        assert!(result.images().is_empty());
    }

    #[test]
    fn info_takes_priority_over_html_info_and_caption() {
        let body = json!({"info": "plain", "html_info": "<p>x</p>", "caption": "c"}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.info().as_text(), Some("plain"));

        let body = json!({"html_info": "<p>x</p>", "caption": "c"}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.info().as_text(), Some("<p>x</p>"));
    }

    #[test]
    fn parameters_are_verbatim() {
        let body = json!({"images": [], "parameters": {"prompt": "x", "steps": 20}}).to_string();
        let result = decode_response(200, &body).unwrap();
        assert_eq!(result.parameters(), Some(&json!({"prompt": "x", "steps": 20})));
        assert!(result.info().is_empty());
    }

    #[test]
    fn non_200_is_service_error_without_decoding() {
        let err = decode_response(500, "internal error").unwrap_err();
        match err {
            ClientError::Service { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_invalid_response() {
        assert!(matches!(decode_response(200, "<html>"), Err(ClientError::InvalidResponse(_))));
    }

    #[test]
    fn broken_image_fails_whole_result() {
        let body = json!({"images": [b64(1), "%%%"]}).to_string();
        assert!(matches!(decode_response(200, &body), Err(ClientError::Encoding(_))));
    }
}
