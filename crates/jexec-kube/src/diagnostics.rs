use k8s_openapi::api::core::v1::Event;

const WARNING: &str = "Warning";

/// Render the warning events among `events`, one per line.
pub(crate) fn format_warnings(events: &[Event]) -> String {
    events
        .iter()
        .filter(|e| e.type_.as_deref() == Some(WARNING))
        .map(|e| {
            let object = &e.involved_object;
            format!(
                "{}/{}: {}: {}",
                object.kind.as_deref().unwrap_or("Object"),
                object.name.as_deref().unwrap_or_default(),
                e.reason.as_deref().unwrap_or_default(),
                e.message.as_deref().unwrap_or_default().trim_end(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
