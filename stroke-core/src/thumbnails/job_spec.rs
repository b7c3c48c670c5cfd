use crate::artifacts::thumbnail_reference;
use crate::types::{Item, ItemId, UserId};

pub const DEFAULT_THUMBNAIL_IMAGE: &str = "girder/dicom_thumbnailer:latest";
pub const THUMBNAIL_JOB_TYPE: &str = "dicom_thumbnail";
pub const THUMBNAIL_OUTPUT_VOLUME: &str = "__thumbnails_output__";

const SLICES: u32 = 11;
const WIDTH: u32 = 256;
const HEIGHT: u32 = 256;

/// Mount points inside the container.
pub const CONTAINER_INPUT_ROOT: &str = "/mnt/stroke/input";
pub const CONTAINER_OUTPUT_ROOT: &str = "/mnt/stroke/output";

/// One container argument, resolved to a concrete string only once the
/// substrate has laid out the volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerArg {
    Literal(String),
    /// The item's files, materialized into a directory named after the item.
    ItemInput { item_id: ItemId, item_name: String },
    /// A writable directory collected after the run.
    OutputVolume { name: String },
}

impl ContainerArg {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Path or value as the container sees it.
    pub fn resolve(&self) -> String {
        match self {
            ContainerArg::Literal(value) => value.clone(),
            ContainerArg::ItemInput { item_name, .. } => {
                format!("{CONTAINER_INPUT_ROOT}/{}", path_component(item_name))
            }
            ContainerArg::OutputVolume { name } => {
                format!("{CONTAINER_OUTPUT_ROOT}/{}", path_component(name))
            }
        }
    }
}

/// Work to run once the container has exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultHook {
    /// Upload every regular file at the top of `volume` to `item_id`,
    /// tagging each upload with `reference`.
    UploadVolumeToItem {
        volume: String,
        item_id: ItemId,
        reference: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub title: String,
    pub job_type: String,
    pub image: String,
    pub args: Vec<ContainerArg>,
    pub hooks: Vec<ResultHook>,
    pub item_id: ItemId,
    pub creator_id: UserId,
}

impl JobSpec {
    /// The thumbnailer run for one item: 11 slices at 256x256 written into the
    /// output volume, then uploaded back onto the item as artifacts.
    pub fn dicom_thumbnail(item: &Item, creator: UserId, image: &str) -> Self {
        let output = ContainerArg::OutputVolume {
            name: THUMBNAIL_OUTPUT_VOLUME.to_string(),
        };
        Self {
            title: format!("DICOM thumbnail generation: {}", item.name),
            job_type: THUMBNAIL_JOB_TYPE.to_string(),
            image: image.to_string(),
            args: vec![
                ContainerArg::literal("--slices"),
                ContainerArg::literal(SLICES.to_string()),
                ContainerArg::literal("--width"),
                ContainerArg::literal(WIDTH.to_string()),
                ContainerArg::literal("--height"),
                ContainerArg::literal(HEIGHT.to_string()),
                ContainerArg::ItemInput {
                    item_id: item.id,
                    item_name: item.name.clone(),
                },
                output,
            ],
            hooks: vec![ResultHook::UploadVolumeToItem {
                volume: THUMBNAIL_OUTPUT_VOLUME.to_string(),
                item_id: item.id,
                reference: thumbnail_reference(),
            }],
            item_id: item.id,
            creator_id: creator,
        }
    }

    pub fn resolved_args(&self) -> Vec<String> {
        self.args.iter().map(ContainerArg::resolve).collect()
    }
}

/// Single safe path component derived from a user-chosen name.
pub fn path_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FolderId, NewItem};

    fn item(name: &str) -> Item {
        NewItem {
            name: name.into(),
            description: String::new(),
            folder_id: FolderId::new(),
            creator_id: UserId::new(),
            is_series: true,
        }
        .into_item()
    }

    #[test]
    fn thumbnail_spec_matches_the_worker_contract() {
        let series = item("AX T1");
        let spec = JobSpec::dicom_thumbnail(&series, UserId::new(), DEFAULT_THUMBNAIL_IMAGE);

        assert_eq!(spec.title, "DICOM thumbnail generation: AX T1");
        assert_eq!(spec.image, "girder/dicom_thumbnailer:latest");
        assert_eq!(
            spec.resolved_args(),
            [
                "--slices",
                "11",
                "--width",
                "256",
                "--height",
                "256",
                "/mnt/stroke/input/AX T1",
                "/mnt/stroke/output/__thumbnails_output__",
            ]
        );
        assert_eq!(
            spec.hooks,
            [ResultHook::UploadVolumeToItem {
                volume: "__thumbnails_output__".into(),
                item_id: series.id,
                reference: r#"{"interactive_thumbnail":true}"#.into(),
            }]
        );
    }

    #[test]
    fn item_names_cannot_escape_the_input_root() {
        let arg = ContainerArg::ItemInput {
            item_id: ItemId::new(),
            item_name: "../../etc".into(),
        };
        assert_eq!(arg.resolve(), "/mnt/stroke/input/.._.._etc");
        assert_eq!(path_component(".."), "_");
    }
}
