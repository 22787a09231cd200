//! Wire and domain types for volume lookups.

use serde::Deserialize;
use serde::Serialize;

/// Body of a `GET /volumes` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumesResponse {
    #[serde(default)]
    pub(crate) total_items: u64,
    #[serde(default)]
    pub(crate) items: Vec<Volume>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    #[serde(default)]
    id: String,
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: String,
    subtitle: Option<String>,
    authors: Vec<String>,
    published_date: Option<String>,
    description: Option<String>,
    categories: Vec<String>,
    page_count: Option<u32>,
    image_links: Option<ImageLinks>,
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageLinks {
    small_thumbnail: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

/// A book as the rest of leafnode sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub page_count: Option<u32>,
    pub thumbnail: Option<String>,
    pub isbn_13: Option<String>,
    pub isbn_10: Option<String>,
}

impl Book {
    /// Year of first publication, when the upstream date starts with one.
    pub fn published_year(&self) -> Option<i32> {
        self.published_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    }
}

impl From<Volume> for Book {
    fn from(volume: Volume) -> Self {
        let info = volume.volume_info;
        let isbn = |kind: &str| {
            info.industry_identifiers
                .iter()
                .find(|id| id.kind == kind)
                .map(|id| id.identifier.clone())
        };
        let isbn_13 = isbn("ISBN_13");
        let isbn_10 = isbn("ISBN_10");

        let title = match info.subtitle {
            Some(subtitle) if !subtitle.is_empty() => format!("{}: {}", info.title, subtitle),
            _ => info.title,
        };
        // Covers are served over plain http by default; browsers block mixed content
        let thumbnail = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail))
            .map(|url| match url.strip_prefix("http://") {
                Some(rest) => format!("https://{rest}"),
                None => url,
            });

        Self {
            id: volume.id,
            title,
            authors: info.authors,
            published_date: info.published_date,
            description: info.description,
            categories: info.categories,
            page_count: info.page_count,
            thumbnail,
            isbn_13,
            isbn_10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUNE: &str = r#"{
        "kind": "books#volumes",
        "totalItems": 1,
        "items": [{
            "id": "B1hSG45JCX4C",
            "volumeInfo": {
                "title": "Dune",
                "authors": ["Frank Herbert"],
                "publishedDate": "1965-08-01",
                "categories": ["Fiction"],
                "pageCount": 412,
                "imageLinks": {"thumbnail": "http://books.example/dune.jpg"},
                "industryIdentifiers": [
                    {"type": "ISBN_10", "identifier": "0441013597"},
                    {"type": "ISBN_13", "identifier": "9780441013593"}
                ]
            }
        }]
    }"#;

    #[test]
    fn it_decodes_a_volume() {
        let response: VolumesResponse = serde_json::from_str(DUNE).unwrap();
        assert_eq!(response.total_items, 1);

        let book = Book::from(response.items.into_iter().next().unwrap());
        assert_eq!(book.id, "B1hSG45JCX4C");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.authors, ["Frank Herbert"]);
        assert_eq!(book.published_year(), Some(1965));
        assert_eq!(book.page_count, Some(412));
        assert_eq!(book.isbn_13.as_deref(), Some("9780441013593"));
        assert_eq!(book.isbn_10.as_deref(), Some("0441013597"));
        assert_eq!(
            book.thumbnail.as_deref(),
            Some("https://books.example/dune.jpg")
        );
    }

    #[test]
    fn missing_fields_default() {
        let response: VolumesResponse =
            serde_json::from_str(r#"{"items": [{"id": "x", "volumeInfo": {"title": "Untitled"}}]}"#)
                .unwrap();
        let book = Book::from(response.items.into_iter().next().unwrap());

        assert!(book.authors.is_empty());
        assert_eq!(book.published_year(), None);
        assert_eq!(book.thumbnail, None);
        assert_eq!(book.isbn_13, None);
    }

    #[test]
    fn no_results_has_no_items() {
        let response: VolumesResponse =
            serde_json::from_str(r#"{"kind": "books#volumes", "totalItems": 0}"#).unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn subtitles_are_joined() {
        let response: VolumesResponse = serde_json::from_str(
            r#"{"items": [{"volumeInfo": {"title": "Blindsight", "subtitle": "A Novel"}}]}"#,
        )
        .unwrap();
        let book = Book::from(response.items.into_iter().next().unwrap());
        assert_eq!(book.title, "Blindsight: A Novel");
    }
}
