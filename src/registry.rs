//! Container registry access.
//!
//! Talks the OCI distribution API over blocking HTTP: a `HEAD` on the
//! manifest endpoint yields the index digest from `Docker-Content-Digest`,
//! and a `GET` returns the manifest list used to pick a platform-specific
//! manifest. Anonymous Bearer token challenges are answered once per request.
//!
//! [`RegistryResolver`] layers the platform/fallback policy over any
//! [`RegistryApi`], so it can be exercised without a network.

use crate::config::{Platform, ProcessorConfig};
use crate::reference::ImageRef;
use crate::resolver::{ImageDigest, Resolver};
use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

const DOCKER_HUB_ENDPOINT: &str = "https://registry-1.docker.io";
const DIGEST_HEADER: &str = "docker-content-digest";

/// Platform fields of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformSpec {
    pub os: String,
    pub architecture: String,
    #[serde(default)]
    pub variant: Option<String>,
}

/// One entry of a manifest index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub platform: Option<PlatformSpec>,
}

/// A fetched manifest, reduced to what platform selection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Multi-platform index or Docker manifest list.
    Index(Vec<ManifestDescriptor>),
    /// Single-platform image manifest.
    Image,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<Vec<ManifestDescriptor>>,
}

impl Manifest {
    /// Interprets a manifest body; `content_type` is the response header, if any.
    pub fn from_json(body: &[u8], content_type: Option<&str>) -> Result<Self> {
        let doc: ManifestDocument =
            serde_json::from_slice(body).context("Failed to parse manifest JSON")?;
        let media_type = doc.media_type.as_deref().or(content_type).unwrap_or_default();
        let is_index = media_type.contains("image.index") || media_type.contains("manifest.list");
        match doc.manifests {
            Some(manifests) if is_index || !manifests.is_empty() => Ok(Self::Index(manifests)),
            _ => Ok(Self::Image),
        }
    }
}

/// Finds the digest of the index entry matching `platform`.
///
/// Without a requested variant the first `os/arch` match wins. `arm64`
/// entries without a variant also satisfy a request for `v8`.
pub fn platform_manifest_digest<'a>(manifest: &'a Manifest, platform: &Platform) -> Option<&'a str> {
    let Manifest::Index(entries) = manifest else {
        return None;
    };
    entries
        .iter()
        .find(|entry| {
            let Some(spec) = &entry.platform else {
                return false;
            };
            if spec.os != platform.os || spec.architecture != platform.architecture {
                return false;
            }
            match (&platform.variant, &spec.variant) {
                (None, _) => true,
                (Some(want), Some(have)) => want == have,
                (Some(want), None) => platform.architecture == "arm64" && want == "v8",
            }
        })
        .map(|entry| entry.digest.as_str())
}

/// The registry operations the resolver depends on.
pub trait RegistryApi {
    /// Digest of the top-level manifest (index digest for multi-platform images).
    fn head_manifest(&self, image: &ImageRef) -> Result<String>;

    /// The top-level manifest itself.
    fn get_manifest(&self, image: &ImageRef) -> Result<Manifest>;
}

/// Resolves images through a [`RegistryApi`], honoring the configured platform.
pub struct RegistryResolver<A> {
    api: A,
}

impl<A: RegistryApi> RegistryResolver<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    fn platform_digest(&self, image: &ImageRef, platform: &Platform) -> Result<String> {
        let manifest = self
            .api
            .get_manifest(image)
            .with_context(|| format!("fetch manifest for {:?}", image.to_string()))?;
        if !matches!(manifest, Manifest::Index(_)) {
            bail!("image {:?} is not a multi-platform image", image.to_string());
        }
        match platform_manifest_digest(&manifest, platform) {
            Some(digest) => Ok(digest.to_string()),
            None => bail!("platform {:?} not found in manifest list", platform.to_string()),
        }
    }
}

impl<A: RegistryApi> Resolver<ImageRef> for RegistryResolver<A> {
    type Id = ImageDigest;

    fn resolve(&self, image: &ImageRef, config: &ProcessorConfig) -> Result<ImageDigest> {
        let mut fallback = None;
        if let Some(platform) = &config.platform {
            match self.platform_digest(image, platform) {
                Ok(digest) => return Ok(ImageDigest::platform(digest)),
                Err(e) => {
                    fallback = Some(format!(
                        "Could not find manifest for platform {}: {:#}. Falling back to index digest.",
                        platform, e
                    ));
                }
            }
        }

        let digest = self
            .api
            .head_manifest(image)
            .with_context(|| format!("fetch manifest for {:?}", image.to_string()))?;
        Ok(ImageDigest {
            fallback,
            ..ImageDigest::index(digest)
        })
    }
}

/// Registry client over HTTPS.
pub struct HttpRegistry {
    client: Client,
}

impl HttpRegistry {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pinref/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build registry HTTP client")?;
        Ok(Self { client })
    }

    fn manifest_url(image: &ImageRef) -> String {
        let endpoint = match image.registry() {
            "docker.io" | "index.docker.io" | "registry-1.docker.io" => DOCKER_HUB_ENDPOINT.to_string(),
            host => format!("https://{}", host),
        };
        format!(
            "{}/v2/{}/manifests/{}",
            endpoint,
            image.repository(),
            image.manifest_selector()
        )
    }

    /// Sends a manifest request, answering a Bearer challenge once if needed.
    fn send(&self, method: reqwest::Method, image: &ImageRef) -> Result<Response> {
        let url = Self::manifest_url(image);
        let response = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, image);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .with_context(|| format!("registry {} requires authentication", image.registry()))?;
        let token = self.fetch_token(&challenge, image)?;

        let response = self
            .client
            .request(method, &url)
            .header(ACCEPT, MANIFEST_ACCEPT)
            .bearer_auth(token)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        check_status(response, image)
    }

    fn fetch_token(&self, challenge: &str, image: &ImageRef) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: Option<String>,
            access_token: Option<String>,
        }

        let Some(params) = parse_bearer_challenge(challenge) else {
            bail!(
                "registry {} requires unsupported authentication: {}",
                image.registry(),
                challenge
            );
        };
        let realm = params
            .get("realm")
            .with_context(|| format!("auth challenge without realm: {}", challenge))?;
        let scope = params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository()));

        let mut query = vec![("scope", scope)];
        if let Some(service) = params.get("service") {
            query.push(("service", service.clone()));
        }

        let response = self
            .client
            .get(realm)
            .query(&query)
            .send()
            .with_context(|| format!("Token request to {} failed", realm))?;
        if !response.status().is_success() {
            bail!("token endpoint {} returned status {}", realm, response.status().as_u16());
        }
        let body: TokenResponse = response.json().context("Failed to parse token response")?;
        body.token
            .or(body.access_token)
            .context("token response did not contain a token")
    }
}

fn check_status(response: Response, image: &ImageRef) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        bail!("registry returned status {} for {}", status.as_u16(), image);
    }
    Ok(response)
}

/// Parses `Bearer realm="...",service="...",scope="..."` into its parameters.
fn parse_bearer_challenge(header: &str) -> Option<HashMap<String, String>> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params = HashMap::new();
    let mut remaining = rest.trim();
    while !remaining.is_empty() {
        let (key, after_key) = remaining.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        let after_key = after_key.trim_start();
        let (value, tail) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };
        params.insert(key, value.to_string());
        remaining = tail.trim_start().trim_start_matches(',').trim_start();
    }
    Some(params)
}

impl RegistryApi for HttpRegistry {
    fn head_manifest(&self, image: &ImageRef) -> Result<String> {
        let response = self.send(reqwest::Method::HEAD, image)?;
        if let Some(digest) = digest_header(&response) {
            return Ok(digest);
        }
        // Some registries only send the digest header on GET.
        let response = self.send(reqwest::Method::GET, image)?;
        digest_header(&response)
            .with_context(|| format!("registry did not return a content digest for {}", image))
    }

    fn get_manifest(&self, image: &ImageRef) -> Result<Manifest> {
        let response = self.send(reqwest::Method::GET, image)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().context("Failed to read manifest body")?;
        Manifest::from_json(&body, content_type.as_deref())
    }
}

fn digest_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
