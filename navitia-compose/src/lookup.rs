//! Searches over the engine's image and container listings.

use crate::{
    error::Result,
    models::{untagged, ContainerSummary, ImageSummary},
    services::ContainerEngine,
};

#[derive(Clone, Copy, Debug)]
pub enum ImageQuery<'a> {
    Id(&'a str),
    /// Repository name, without tag.
    Name(&'a str),
}

pub fn find_image(
    engine: &mut dyn ContainerEngine,
    query: ImageQuery,
) -> Result<Option<ImageSummary>> {
    let images = engine.list_images()?;

    let image = images.into_iter().find(|image| match query {
        ImageQuery::Id(id) => image.id.0 == id,
        ImageQuery::Name(name) => image.repo_tags.iter().any(|tag| untagged(tag) == name),
    });

    Ok(image)
}

/// Finds a container by name and/or by the image it was created from.
///
/// With a name, the image only narrows the search. Without a name, the
/// first container created from the image wins.
pub fn find_container(
    engine: &mut dyn ContainerEngine,
    name: Option<&str>,
    image: Option<&str>,
    include_stopped: bool,
) -> Result<Option<ContainerSummary>> {
    if name.is_none() && image.is_none() {
        return Ok(None);
    }

    let containers = engine.list_containers(include_stopped)?;

    let container = containers.into_iter().find(|container| {
        let image_matches = image
            .map(|image| untagged(&container.image) == image)
            .unwrap_or(true);
        let name_matches = name
            .map(|name| {
                container
                    .names
                    .iter()
                    .any(|candidate| candidate.trim_start_matches('/') == name)
            })
            .unwrap_or(true);

        image_matches && name_matches
    });

    Ok(container)
}
