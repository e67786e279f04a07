//! Built-in service profiles
//!
//! Each profile is the fixed, ordered capability table for one managed
//! service. Order matters: it is the order workers and dispatch operations
//! are built in.

use crate::error::{Result, RouterError};

use super::entry::{Registry, RegistryEntry};
use super::prompts::{PromptOverrides, default_agent_instructions, default_identity, default_supervisor_instructions};

/// Static capability table for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    /// Lower-case key used in config and on the command line
    pub name: &'static str,
    pub display_name: &'static str,
    pub tags: &'static [&'static str],
}

pub const RADARR: ServiceProfile = ServiceProfile {
    name: "radarr",
    display_name: "Radarr",
    tags: &[
        "AlternativeTitle", "ApiInfo", "Authentication", "AutoTagging", "Backup", "Blocklist",
        "Calendar", "CalendarFeed", "Collection", "Command", "Credit", "CustomFilter",
        "CustomFormat", "Cutoff", "DelayProfile", "DiskSpace", "DownloadClient",
        "DownloadClientConfig", "ExtraFile", "FileSystem", "Health", "History", "HostConfig",
        "ImportList", "ImportListConfig", "ImportListExclusion", "ImportListMovies", "Indexer",
        "IndexerConfig", "IndexerFlag", "Language", "Localization", "Log", "LogFile",
        "ManualImport", "MediaCover", "MediaManagementConfig", "Metadata", "MetadataConfig",
        "Missing", "Movie", "MovieEditor", "MovieFile", "MovieFolder", "MovieImport", "MovieLookup",
        "NamingConfig", "Notification", "Parse", "Ping", "QualityDefinition", "QualityProfile",
        "QualityProfileSchema", "Queue", "QueueAction", "QueueDetails", "QueueStatus", "Release",
        "ReleaseProfile", "ReleasePush", "RemotePathMapping", "RenameMovie", "RootFolder",
        "StaticResource", "System", "Tag", "TagDetails", "Task", "UiConfig", "Update",
        "UpdateLogFile",
    ],
};

pub const SONARR: ServiceProfile = ServiceProfile {
    name: "sonarr",
    display_name: "Sonarr",
    tags: &[
        "ApiInfo", "Authentication", "AutoTagging", "Backup", "Blocklist", "Calendar",
        "CalendarFeed", "Command", "CustomFilter", "CustomFormat", "Cutoff", "DelayProfile",
        "DiskSpace", "DownloadClient", "DownloadClientConfig", "Episode", "EpisodeFile",
        "FileSystem", "Health", "History", "HostConfig", "ImportList", "ImportListConfig",
        "ImportListExclusion", "Indexer", "IndexerConfig", "IndexerFlag", "Language",
        "LanguageProfile", "LanguageProfileSchema", "Localization", "Log", "LogFile",
        "ManualImport", "MediaCover", "MediaManagementConfig", "Metadata", "Missing",
        "NamingConfig", "Notification", "Parse", "Ping", "QualityDefinition", "QualityProfile",
        "QualityProfileSchema", "Queue", "QueueAction", "QueueDetails", "QueueStatus", "Release",
        "ReleaseProfile", "ReleasePush", "RemotePathMapping", "RenameEpisode", "RootFolder",
        "SeasonPass", "Series", "SeriesEditor", "SeriesFolder", "SeriesImport", "SeriesLookup",
        "StaticResource", "System", "Tag", "TagDetails", "Task", "UiConfig", "Update",
        "UpdateLogFile",
    ],
};

pub const PROWLARR: ServiceProfile = ServiceProfile {
    name: "prowlarr",
    display_name: "Prowlarr",
    tags: &[
        "ApiInfo", "AppProfile", "Application", "Authentication", "Backup", "Command",
        "CustomFilter", "DevelopmentConfig", "DownloadClient", "DownloadClientConfig", "FileSystem",
        "Health", "History", "HostConfig", "Indexer", "IndexerDefaultCategories", "IndexerProxy",
        "IndexerStats", "IndexerStatus", "Localization", "Log", "LogFile", "Newznab",
        "Notification", "Ping", "Search", "StaticResource", "System", "Tag", "TagDetails", "Task",
        "UiConfig", "Update", "UpdateLogFile",
    ],
};

pub const CHAPTARR: ServiceProfile = ServiceProfile {
    name: "chaptarr",
    display_name: "Chaptarr",
    tags: &[
        "AuthorLookup", "Backup", "Blocklist", "Book", "BookEditor", "BookFile", "BookLookup",
        "Bookshelf", "Calendar", "CalendarFeed", "Command", "CustomFilter", "CustomFormat",
        "Cutoff", "DelayProfile", "DevelopmentConfig", "DiskSpace", "DownloadClient",
        "DownloadClientConfig", "Edition", "FileSystem", "Health", "History", "HostConfig",
        "ImportList", "ImportListExclusion", "Indexer", "IndexerConfig", "IndexerFlag", "Language",
        "Localization", "Log", "LogFile", "ManualImport", "MediaCover", "MediaManagementConfig",
        "Metadata", "MetadataProfile", "MetadataProfileSchema", "MetadataProviderConfig", "Missing",
        "NamingConfig", "Notification", "Parse", "Ping", "QualityDefinition", "QualityProfile",
        "QualityProfileSchema", "Queue", "QueueAction", "QueueDetails", "QueueStatus", "Release",
        "ReleaseProfile", "ReleasePush", "RemotePathMapping", "RenameBook", "RetagBook",
        "RootFolder", "Search", "Series", "StaticResource", "System", "Tag", "TagDetails", "Task",
        "UiConfig", "Update", "UpdateLogFile",
    ],
};

/// Every built-in profile
pub const PROFILES: &[ServiceProfile] = &[RADARR, SONARR, PROWLARR, CHAPTARR];

/// Look up a built-in profile by name, case-insensitively
pub fn profile(name: &str) -> Option<&'static ServiceProfile> {
    PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Look up a profile or fail with the list of known names
pub fn require_profile(name: &str) -> Result<&'static ServiceProfile> {
    profile(name).ok_or_else(|| {
        let known: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        RouterError::RegistryConfig(format!(
            "unknown service profile '{}' (known: {})",
            name,
            known.join(", ")
        ))
    })
}

impl ServiceProfile {
    /// Build the registry for this service, applying instruction overrides
    pub fn registry(&self, prompts: &PromptOverrides) -> Result<Registry> {
        let entries = self
            .tags
            .iter()
            .map(|tag| {
                let instructions = prompts
                    .agent(tag)
                    .map(str::to_string)
                    .unwrap_or_else(|| default_agent_instructions(self.display_name, tag));
                RegistryEntry::new(*tag, default_identity(self.display_name, tag), instructions)
            })
            .collect::<Result<Vec<_>>>()?;
        Registry::new(entries)
    }

    /// Coordinator instructions for this service
    pub fn supervisor_instructions(&self, prompts: &PromptOverrides) -> String {
        prompts
            .supervisor()
            .map(str::to_string)
            .unwrap_or_else(|| default_supervisor_instructions(self.display_name))
    }
}
