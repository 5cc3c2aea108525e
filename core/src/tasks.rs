//! Deep links into the music app, with web fallbacks.
//!
//! # Design
//! Each task computes a pair of URIs: an app-to-app link handled by the music
//! app and a web page for devices without it. The host supplies a `Launcher`;
//! `show` tries the app link first and falls back to the web page when the
//! launcher refuses it. Computing URIs is pure, so tasks can be inspected
//! without launching anything.

use url::Url;

use crate::error::{LaunchError, TaskError};

const APP_ROOT: &str = "nokia-music://";
const WEB_ROOT: &str = "http://www.mixrad.io/";

/// Opens a URI on the host platform.
pub trait Launcher {
    fn launch(&self, uri: &Url) -> Result<(), LaunchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchUris {
    pub app: Url,
    pub web: Url,
}

impl LaunchUris {
    fn parse(app: &str, web: &str) -> Result<Self, TaskError> {
        Ok(Self {
            app: Url::parse(app)?,
            web: Url::parse(web)?,
        })
    }
}

/// Which of the two URIs the launcher accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTarget {
    App,
    Web,
}

pub fn launch_with_fallback(launcher: &dyn Launcher, uris: &LaunchUris) -> Result<LaunchTarget, TaskError> {
    match launcher.launch(&uris.app) {
        Ok(()) => Ok(LaunchTarget::App),
        Err(e) => {
            tracing::debug!(uri = %uris.app, error = %e, "app launch refused, falling back to web");
            launcher.launch(&uris.web)?;
            Ok(LaunchTarget::Web)
        }
    }
}

/// A deep link that can be shown through a `Launcher`.
pub trait DeepLinkTask {
    fn uris(&self) -> Result<LaunchUris, TaskError>;

    fn show(&self, launcher: &dyn Launcher) -> Result<LaunchTarget, TaskError> {
        launch_with_fallback(launcher, &self.uris()?)
    }
}

fn strip_ampersands(value: &str) -> String {
    value.replace('&', "")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Opens the app's home screen.
#[derive(Debug, Clone, Default)]
pub struct LaunchTask;

impl DeepLinkTask for LaunchTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        LaunchUris::parse(APP_ROOT, WEB_ROOT)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MusicSearchTask {
    pub search_terms: Option<String>,
}

impl MusicSearchTask {
    pub fn new(search_terms: impl Into<String>) -> Self {
        Self {
            search_terms: Some(search_terms.into()),
        }
    }
}

impl DeepLinkTask for MusicSearchTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        let terms = non_empty(&self.search_terms).ok_or(TaskError::MissingParameter("search terms"))?;
        LaunchUris::parse(
            &format!("{APP_ROOT}search/anything/?term={terms}"),
            &format!("{WEB_ROOT}artists/{}/", strip_ampersands(terms)),
        )
    }
}

/// Plays a mix by id, or an artist mix by name.
#[derive(Debug, Clone, Default)]
pub struct PlayMixTask {
    pub mix_id: Option<String>,
    pub artist_name: Option<String>,
}

impl PlayMixTask {
    pub fn for_mix(mix_id: impl Into<String>) -> Self {
        Self {
            mix_id: Some(mix_id.into()),
            artist_name: None,
        }
    }

    pub fn for_artist(artist_name: impl Into<String>) -> Self {
        Self {
            mix_id: None,
            artist_name: Some(artist_name.into()),
        }
    }
}

impl DeepLinkTask for PlayMixTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        if let Some(id) = non_empty(&self.mix_id) {
            return LaunchUris::parse(
                &format!("{APP_ROOT}play/mix/?id={id}"),
                &format!("{WEB_ROOT}mixes/_/{id}/"),
            );
        }
        if let Some(name) = non_empty(&self.artist_name) {
            let name = strip_ampersands(name);
            return LaunchUris::parse(
                &format!("{APP_ROOT}play/artist/?artist={name}"),
                &format!("{WEB_ROOT}artists/{name}/"),
            );
        }
        Err(TaskError::MissingParameter("a mix id or artist name"))
    }
}

/// Shows an artist by id, or searches for one by name.
#[derive(Debug, Clone, Default)]
pub struct ShowArtistTask {
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
}

impl ShowArtistTask {
    pub fn for_id(artist_id: impl Into<String>) -> Self {
        Self {
            artist_id: Some(artist_id.into()),
            artist_name: None,
        }
    }

    pub fn for_name(artist_name: impl Into<String>) -> Self {
        Self {
            artist_id: None,
            artist_name: Some(artist_name.into()),
        }
    }
}

impl DeepLinkTask for ShowArtistTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        if let Some(id) = non_empty(&self.artist_id) {
            return LaunchUris::parse(
                &format!("{APP_ROOT}show/artist/?id={id}"),
                &format!("{WEB_ROOT}artists/_/{id}/"),
            );
        }
        if let Some(name) = non_empty(&self.artist_name) {
            return LaunchUris::parse(
                &format!("{APP_ROOT}show/artist/?name={}", strip_ampersands(name)),
                &format!("http://music.nokia.com/r/search/{name}"),
            );
        }
        Err(TaskError::MissingParameter("an artist id or name"))
    }
}

/// Shows gigs, optionally filtered by search terms.
#[derive(Debug, Clone, Default)]
pub struct ShowGigsTask {
    pub search_terms: Option<String>,
}

impl DeepLinkTask for ShowGigsTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        let app = match non_empty(&self.search_terms) {
            Some(terms) => format!("{APP_ROOT}search/gigs/?term={terms}"),
            None => format!("{APP_ROOT}show/gigs/"),
        };
        LaunchUris::parse(&app, WEB_ROOT)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShowProductTask {
    pub product_id: Option<String>,
}

impl ShowProductTask {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: Some(product_id.into()),
        }
    }
}

impl DeepLinkTask for ShowProductTask {
    fn uris(&self) -> Result<LaunchUris, TaskError> {
        let id = non_empty(&self.product_id).ok_or(TaskError::MissingParameter("a product id"))?;
        LaunchUris::parse(
            &format!("{APP_ROOT}show/product/?id={id}"),
            &format!("{WEB_ROOT}products/_/{id}/"),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Accepts only URIs with the given scheme and records every attempt.
    struct RecordingLauncher {
        accepts: &'static str,
        attempts: RefCell<Vec<String>>,
    }

    impl RecordingLauncher {
        fn accepting(scheme: &'static str) -> Self {
            Self {
                accepts: scheme,
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, uri: &Url) -> Result<(), LaunchError> {
            self.attempts.borrow_mut().push(uri.to_string());
            if uri.scheme() == self.accepts {
                Ok(())
            } else {
                Err(LaunchError::Unsupported(uri.scheme().to_string()))
            }
        }
    }

    #[test]
    fn app_link_is_tried_first() {
        let launcher = RecordingLauncher::accepting("nokia-music");
        let target = ShowProductTask::new("27015553").show(&launcher).unwrap();

        assert_eq!(target, LaunchTarget::App);
        assert_eq!(
            *launcher.attempts.borrow(),
            vec!["nokia-music://show/product/?id=27015553".to_string()]
        );
    }

    #[test]
    fn web_page_is_the_fallback() {
        let launcher = RecordingLauncher::accepting("http");
        let target = ShowArtistTask::for_id("123").show(&launcher).unwrap();

        assert_eq!(target, LaunchTarget::Web);
        assert_eq!(
            *launcher.attempts.borrow(),
            vec![
                "nokia-music://show/artist/?id=123".to_string(),
                "http://www.mixrad.io/artists/_/123/".to_string(),
            ]
        );
    }

    #[test]
    fn refusal_of_both_links_is_reported() {
        let launcher = RecordingLauncher::accepting("ftp");
        let err = LaunchTask.show(&launcher).unwrap_err();
        assert!(matches!(err, TaskError::Launch(LaunchError::Unsupported(_))));
    }

    #[test]
    fn launch_task_opens_the_roots() {
        let uris = LaunchTask.uris().unwrap();
        assert_eq!(uris.app.scheme(), "nokia-music");
        assert_eq!(uris.web.as_str(), "http://www.mixrad.io/");
    }

    #[test]
    fn search_strips_ampersands_from_the_web_link() {
        let uris = MusicSearchTask::new("Simon & Garfunkel").uris().unwrap();
        assert!(uris.app.as_str().starts_with("nokia-music://search/anything/?term=Simon"));
        assert_eq!(uris.web.as_str(), "http://www.mixrad.io/artists/Simon%20%20Garfunkel/");
    }

    #[test]
    fn search_requires_terms() {
        for task in [MusicSearchTask::default(), MusicSearchTask::new("")] {
            assert!(matches!(task.uris(), Err(TaskError::MissingParameter(_))));
        }
    }

    #[test]
    fn play_mix_prefers_the_mix_id() {
        let task = PlayMixTask {
            mix_id: Some("1234".to_string()),
            artist_name: Some("Coldplay".to_string()),
        };
        let uris = task.uris().unwrap();
        assert_eq!(uris.app.as_str(), "nokia-music://play/mix/?id=1234");
        assert_eq!(uris.web.as_str(), "http://www.mixrad.io/mixes/_/1234/");

        let uris = PlayMixTask::for_artist("Coldplay").uris().unwrap();
        assert_eq!(uris.app.as_str(), "nokia-music://play/artist/?artist=Coldplay");
        assert_eq!(uris.web.as_str(), "http://www.mixrad.io/artists/Coldplay/");

        assert!(PlayMixTask::default().uris().is_err());
    }

    #[test]
    fn show_artist_by_name_uses_the_search_page() {
        let uris = ShowArtistTask::for_name("Madness").uris().unwrap();
        assert_eq!(uris.app.as_str(), "nokia-music://show/artist/?name=Madness");
        assert_eq!(uris.web.as_str(), "http://music.nokia.com/r/search/Madness");

        assert!(matches!(
            ShowArtistTask::default().uris(),
            Err(TaskError::MissingParameter(_))
        ));
    }

    #[test]
    fn gigs_work_with_or_without_terms() {
        let all = ShowGigsTask::default().uris().unwrap();
        assert_eq!(all.app.as_str(), "nokia-music://show/gigs/");

        let filtered = ShowGigsTask {
            search_terms: Some("Muse".to_string()),
        }
        .uris()
        .unwrap();
        assert_eq!(filtered.app.as_str(), "nokia-music://search/gigs/?term=Muse");
        assert_eq!(filtered.web.as_str(), "http://www.mixrad.io/");
    }

    #[test]
    fn product_requires_an_id() {
        let err = ShowProductTask::default().uris().unwrap_err();
        assert_eq!(err.to_string(), "a product id must be set before calling show()");
    }
}
