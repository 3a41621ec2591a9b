//! Prompt construction for the story pipeline.

use trailweaver_domain::{Breakpoint, NarrativeStyle, Route};

use crate::infrastructure::history::HistoricalContext;

pub const SKELETON_SYSTEM: &str = "You are a narrative designer for an outdoor exploration app. \
     You write immersive route stories that turn real walks into adventures. \
     Respond with JSON only, no prose around it.";

pub const CHAPTER_SYSTEM: &str = "You are a narrative designer writing one chapter of an ongoing \
     route story. Stay consistent with the outline and the previous chapter. \
     Respond with JSON only, no prose around it.";

/// Stage A: one call for prologue, outline, and epilogue.
pub fn skeleton_prompt(route: &Route, style: NarrativeStyle) -> String {
    let poi_names: Vec<String> = route
        .breakpoints
        .iter()
        .map(|b| {
            b.poi_name
                .clone()
                .unwrap_or_else(|| format!("waypoint {}", b.order_index + 1))
        })
        .collect();

    format!(
        "Write the frame of a {style} story for an outdoor route.\n\
         Route title: {title}\n\
         Location: {location}\n\
         Length: {length_km:.1} km\n\
         Stops along the way: {count}\n\
         Points of interest, in order: {pois}\n\n\
         Return JSON with exactly these fields:\n\
         {{\n\
           \"prologue_title\": \"evocative title for the journey\",\n\
           \"prologue_body\": \"2-3 paragraphs setting the scene before the first stop\",\n\
           \"epilogue_body\": \"1-2 paragraphs closing the journey\",\n\
           \"outline_per_breakpoint\": [\"one-sentence beat for each stop, in order\"]\n\
         }}",
        style = style,
        title = route.title,
        location = route.location.as_deref().unwrap_or("an unnamed landscape"),
        length_km = route.length_km(),
        count = route.breakpoints.len(),
        pois = poi_names.join(", "),
    )
}

/// Stage B: one call per breakpoint.
pub fn chapter_prompt(
    route: &Route,
    breakpoint: &Breakpoint,
    style: NarrativeStyle,
    outline_beat: &str,
    previous_closing: Option<&str>,
    context: &HistoricalContext,
) -> String {
    let poi = breakpoint.poi_name.as_deref().unwrap_or("the next stop");
    let poi_type = breakpoint.poi_type.as_deref().unwrap_or("landmark");
    let continuity = match previous_closing {
        Some(closing) => format!("The previous chapter ended with: \"{closing}\"\n"),
        None => String::new(),
    };

    format!(
        "Write chapter {number} of the {style} story for the route \"{title}\".\n\
         {continuity}\
         This chapter takes place at: {poi} (a {poi_type}).\n\
         Outline beat for this chapter: {outline_beat}\n\
         Historical context you MUST weave in verbatim: {context}\n\n\
         The chapter should be roughly 1000 words and end on a sentence that \
         leads toward the next stop.\n\
         Also invent 1-2 small quests a walker can do at this spot. Quest types: \
         photo, observation, collection, puzzle. A puzzle quest needs a question, \
         exactly 4 choices, and the index of the correct one; the other types need \
         only a description.\n\n\
         Return JSON with exactly these fields:\n\
         {{\n\
           \"chapter\": \"the chapter text\",\n\
           \"quests\": [\n\
             {{\"type\": \"photo|observation|collection\", \"description\": \"...\"}},\n\
             {{\"type\": \"puzzle\", \"question\": \"...\", \"choices\": [\"a\",\"b\",\"c\",\"d\"], \"correct_index\": 0}}\n\
           ]\n\
         }}",
        number = breakpoint.order_index + 1,
        style = style,
        title = route.title,
        continuity = continuity,
        poi = poi,
        poi_type = poi_type,
        outline_beat = outline_beat,
        context = context.text,
    )
}

/// Deterministic Stage A fallback, keyed only on route metadata. The
/// pipeline always persists something.
pub fn fallback_skeleton(route: &Route) -> (String, String, String) {
    let location = route.location.as_deref().unwrap_or("the open country");
    let prologue_title = format!("The Way Through {location}");
    let prologue_body = format!(
        "Every journey starts with a single decision: to go. Ahead of you lie \
         {length_km:.1} kilometers of {category} through {location}, with {count} \
         stops worth slowing down for. {title} is not a race. It is a string of \
         small discoveries, and the first one is waiting just past the trailhead.",
        length_km = route.length_km(),
        category = route.category,
        location = location,
        count = route.breakpoints.len(),
        title = route.title,
    );
    let epilogue_body = format!(
        "The last steps of {title} bring you back to where maps end and memory \
         begins. {length_km:.1} kilometers are behind you, and every stop along \
         the way has added a line to the story only you can tell.",
        title = route.title,
        length_km = route.length_km(),
    );
    (prologue_title, prologue_body, epilogue_body)
}

/// Outline beat used when the persisted skeleton predates this run and the
/// generated outline is gone.
pub fn fallback_outline_beat(breakpoint: &Breakpoint) -> String {
    match &breakpoint.poi_name {
        Some(name) => format!("The journey reaches {name}."),
        None => format!("The journey reaches stop {}.", breakpoint.order_index + 1),
    }
}
