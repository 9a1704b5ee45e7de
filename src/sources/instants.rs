use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use super::SoundDetails;

/// Un resultado de búsqueda de MyInstants: nombre visible más las rutas
/// relativas a su página y a su mp3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantCandidate {
    pub name: String,
    pub page_path: String,
    pub media_path: String,
}

/// Cliente de scraping de MyInstants. La web no tiene API pública: la
/// búsqueda y los detalles salen del HTML, igual que siempre ha hecho el
/// bot. Si la web cambia de marcado, esto es lo que hay que retocar.
pub struct InstantsClient {
    http: reqwest::Client,
    base_url: String,
    result_limit: usize,
}

impl InstantsClient {
    pub fn new(base_url: String, result_limit: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            result_limit,
        }
    }

    /// Busca instants por nombre. Devuelve los resultados en el orden de la
    /// página, acotados al límite configurado; sin resultados, lista vacía.
    pub async fn search(&self, query: &str) -> Result<Vec<InstantCandidate>> {
        let url = format!(
            "{}/search?name={}",
            self.base_url,
            urlencoding::encode(query)
        );
        debug!("🔎 Buscando instants: {}", url);

        let html = self
            .http
            .get(&url)
            .send()
            .await
            .context("fallo al consultar la búsqueda de MyInstants")?
            .text()
            .await
            .context("fallo al leer la respuesta de búsqueda")?;

        parse_search_results(&html, self.result_limit)
    }

    /// Primer resultado de la búsqueda, si lo hay.
    pub async fn first_match(&self, query: &str) -> Result<Option<InstantCandidate>> {
        Ok(self.search(query).await?.into_iter().next())
    }

    /// Raspa la página del instant para sacar sus metadatos de presentación.
    pub async fn details(&self, candidate: &InstantCandidate) -> Result<SoundDetails> {
        let url = self.page_url(candidate);
        let html = self
            .http
            .get(&url)
            .send()
            .await
            .context("fallo al consultar la página del instant")?
            .text()
            .await
            .context("fallo al leer la página del instant")?;

        Ok(parse_details(&html))
    }

    pub fn media_url(&self, candidate: &InstantCandidate) -> String {
        format!("{}{}", self.base_url, candidate.media_path)
    }

    pub fn page_url(&self, candidate: &InstantCandidate) -> String {
        format!("{}{}", self.base_url, candidate.page_path)
    }
}

/// Extrae los resultados de la página de búsqueda. Cada instant aparece
/// como un botón `play('/media/... .mp3')` seguido de su enlace
/// `instant-link`; ambas listas van en el mismo orden, así que se emparejan
/// por posición.
fn parse_search_results(html: &str, limit: usize) -> Result<Vec<InstantCandidate>> {
    let media_re = Regex::new(r"play\('(/media/[^']+?\.mp3)'")?;
    let link_re = Regex::new(r#"<a[^>]*class="instant-link[^>]*>([^<]+)</a>"#)?;
    let href_re = Regex::new(r#"href="([^"]+)""#)?;

    let media_paths: Vec<&str> = media_re
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let mut candidates = Vec::new();
    for (captures, media_path) in link_re.captures_iter(html).zip(media_paths) {
        let tag = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
        let Some(page_path) = href_re
            .captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        let name = captures
            .get(1)
            .map(|m| m.as_str().trim())
            .unwrap_or_default();

        candidates.push(InstantCandidate {
            name: name.to_string(),
            page_path: page_path.to_string(),
            media_path: media_path.to_string(),
        });

        if candidates.len() >= limit {
            break;
        }
    }

    Ok(candidates)
}

/// Raspa la página de detalle de un instant. Cada campo que falte en el
/// HTML queda ausente en lugar de fallar; el uploader cae en "Anonymous".
fn parse_details(html: &str) -> SoundDetails {
    let capture = |pattern: &str| -> Option<String> {
        Regex::new(pattern)
            .ok()?
            .captures(html)?
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let uploader = Regex::new(r#"<a href="(/profile[^"]+)"[^>]*>([^<]+)</a>"#)
        .ok()
        .and_then(|re| re.captures(html))
        .map(|c| {
            (
                c.get(2).map(|m| m.as_str().trim().to_string()),
                c.get(1).map(|m| m.as_str().to_string()),
            )
        });

    SoundDetails {
        title: capture(r#"id="instant-page-title"[^>]*>([^<]+)<"#),
        description: capture(r#"(?s)id="instant-page-description"[^>]*>.*?<p[^>]*>([^<]+)</p>"#),
        like_count: capture(r#"(?s)id="instant-page-likes"[^>]*>.*?<b>([^<]+)</b>"#),
        uploader_name: uploader
            .as_ref()
            .and_then(|(name, _)| name.clone())
            .unwrap_or_else(|| "Anonymous".to_string()),
        uploader_url: uploader.and_then(|(_, url)| url),
        view_count: capture(r"([\d,]+)\s*views"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEARCH_FIXTURE: &str = r#"
        <div id="results">
          <div class="instant">
            <button class="small-button" onclick="play('/media/sounds/bruh.mp3', 'bruh')"></button>
            <a href="/instant/bruh-sound-effect/" class="instant-link link-secondary">Bruh Sound Effect</a>
          </div>
          <div class="instant">
            <button class="small-button" onclick="play('/media/sounds/oof.mp3', 'oof')"></button>
            <a href="/instant/roblox-oof/" class="instant-link link-secondary">Roblox Oof</a>
          </div>
          <div class="instant">
            <button class="small-button" onclick="play('/media/sounds/airhorn_1.mp3', 'air')"></button>
            <a href="/instant/mlg-airhorn/" class="instant-link link-secondary"> MLG Airhorn </a>
          </div>
        </div>
    "#;

    const DETAILS_FIXTURE: &str = r#"
        <h1 id="instant-page-title">Bruh Sound Effect #2</h1>
        <div id="instant-page-description"><p>The original bruh.</p></div>
        <div id="instant-page-likes"><b>12,345</b> users liked this</div>
        <div id="instant-page-views">
          Uploaded by <a href="/profile/bruhmaster/" class="link-secondary">bruhmaster</a>
          1,234,567 views
        </div>
    "#;

    #[test]
    fn test_parse_search_results_in_page_order() {
        let results = parse_search_results(SEARCH_FIXTURE, 25).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0],
            InstantCandidate {
                name: "Bruh Sound Effect".to_string(),
                page_path: "/instant/bruh-sound-effect/".to_string(),
                media_path: "/media/sounds/bruh.mp3".to_string(),
            }
        );
        // Los nombres llegan sin el espacio del marcado.
        assert_eq!(results[2].name, "MLG Airhorn");
    }

    #[test]
    fn test_parse_search_respects_result_limit() {
        let results = parse_search_results(SEARCH_FIXTURE, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].name, "Roblox Oof");
    }

    #[test]
    fn test_parse_search_empty_page_yields_no_matches() {
        let results = parse_search_results("<html><body>No results</body></html>", 25).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_details_full_page() {
        let details = parse_details(DETAILS_FIXTURE);

        assert_eq!(details.title.as_deref(), Some("Bruh Sound Effect #2"));
        assert_eq!(details.description.as_deref(), Some("The original bruh."));
        assert_eq!(details.like_count.as_deref(), Some("12,345"));
        assert_eq!(details.uploader_name, "bruhmaster");
        assert_eq!(details.uploader_url.as_deref(), Some("/profile/bruhmaster/"));
        assert_eq!(details.view_count.as_deref(), Some("1,234,567"));
    }

    #[test]
    fn test_parse_details_missing_fields_fall_back() {
        let details = parse_details("<html><body></body></html>");

        assert_eq!(details.title, None);
        assert_eq!(details.uploader_name, "Anonymous");
        assert_eq!(details.uploader_url, None);
        assert_eq!(details.view_count, None);
    }

    #[test]
    fn test_media_and_page_urls_are_absolute() {
        let client = InstantsClient::new("https://www.myinstants.com".to_string(), 25);
        let candidate = InstantCandidate {
            name: "Bruh".to_string(),
            page_path: "/instant/bruh/".to_string(),
            media_path: "/media/sounds/bruh.mp3".to_string(),
        };

        assert_eq!(
            client.media_url(&candidate),
            "https://www.myinstants.com/media/sounds/bruh.mp3"
        );
        assert_eq!(
            client.page_url(&candidate),
            "https://www.myinstants.com/instant/bruh/"
        );
    }
}
