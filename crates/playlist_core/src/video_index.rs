use indexmap::IndexMap;
use serde::Serialize;

use crate::models::PlaylistItem;

/// A unique video and the playlists it was observed in, with the publish
/// timestamp recorded for each membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Video {
    pub video_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub channel_title: Option<String>,
    pub playlist_memberships: IndexMap<String, Option<String>>,
}

impl Video {
    fn from_item(item: &PlaylistItem) -> Self {
        let mut playlist_memberships = IndexMap::new();
        playlist_memberships.insert(item.playlist_id.clone(), item.published_at.clone());
        Self {
            video_id: item.video_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            channel_title: item.channel_title.clone(),
            playlist_memberships,
        }
    }

    /// Playlist ids in the order they were first recorded.
    pub fn playlist_ids(&self) -> Vec<&str> {
        self.playlist_memberships.keys().map(String::as_str).collect()
    }

    pub fn membership(&self, playlist_id: &str) -> Option<&str> {
        self.playlist_memberships
            .get(playlist_id)
            .and_then(|timestamp| timestamp.as_deref())
    }
}

/// Deduplicated videos keyed by video id, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct VideoIndex {
    videos: IndexMap<String, Video>,
}

impl VideoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first observation fixes title, description and channel; later ones
    /// only set the membership timestamp for their playlist.
    pub fn add_item(&mut self, item: &PlaylistItem) {
        match self.videos.get_mut(&item.video_id) {
            Some(video) => {
                video
                    .playlist_memberships
                    .insert(item.playlist_id.clone(), item.published_at.clone());
            }
            None => {
                self.videos
                    .insert(item.video_id.clone(), Video::from_item(item));
            }
        }
    }

    pub fn get(&self, video_id: &str) -> Option<&Video> {
        self.videos.get(video_id)
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Video> + '_ {
        self.videos.values()
    }
}

impl<'a> IntoIterator for &'a VideoIndex {
    type Item = &'a Video;
    type IntoIter = indexmap::map::Values<'a, String, Video>;

    fn into_iter(self) -> Self::IntoIter {
        self.videos.values()
    }
}
