//! Experiment task presets: checklists with an optional starting document

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TaskPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub tasks: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<&'static str>,
}

pub const CAMERA_DOCUMENT: &str = r#"<style>
#container {
  color: white;
  font-family: "Arial";
}
#menu {
  position: absolute;
  top: 0;
  left: 0;
  right: 0;
  height: 50px;
  display: flex;
  align-items: center;
  background-color: rgb(25, 25, 25);
}
#title {
  margin-left: 20px;
  font-size: 1.5rem;
  font-weight: bold;
}
#menu-items {
  margin-left: auto;
  margin-right: 20px;
}
.menu-item {
  cursor: pointer;
}
#camera-background {
  position: absolute;
  top: 50px;
  left: 0;
}
</style>

<body id="container">
<div id="menu">
<span id="title">Cameras</span>
<div id="menu-items">
  <span class="menu-item" id="menu-home">Home</span>
  <span class="menu-item" id="menu-about">About</span>
  <span class="menu-item" id="menu-contact">Contact</span>
</div>
</div>
<img id="camera-background" src="/camera.webp" />
</body>"#;

static PRESETS: &[TaskPreset] = &[
    TaskPreset {
        key: "none",
        name: "No current task",
        tasks: &[],
        document: None,
    },
    TaskPreset {
        key: "camera",
        name: "Cameras",
        tasks: &[
            "Add a menu item saying \"Webshop\".",
            "Add a text to the middle of the page saying \"We sell cameras\".",
            "Ensure there is enough contrast between the background image and the title without restyling the image.",
            "Add a styled \"Buy\" button under that text.",
        ],
        document: Some(CAMERA_DOCUMENT),
    },
    TaskPreset {
        key: "researcher",
        name: "Personal website for a researcher",
        tasks: &[
            "Create a personal website for a human-computer interaction researcher living in Denmark.",
            "Add an \"About me\" section with a short introduction.",
            "Add a teaching section with at least one university course and its description.",
            "Add a research section listing the title and year of five publications.",
            "End the page with a contact form; it does not have to submit anywhere.",
            "Fill every section with example content, no placeholders.",
            "Make the page visually appealing once the structure is in place.",
            "Add a Danish translation and a way to switch between the two languages.",
        ],
        document: None,
    },
    TaskPreset {
        key: "memory",
        name: "Memory game",
        tasks: &[
            "Implement a memory game with HTML and JavaScript.",
            "Add at least 10 cards randomly positioned on the screen.",
            "Give every card a hidden letter with exactly one matching pair, revealed on click.",
            "Turn matching cards green and remove them after half a second.",
            "Turn mismatching cards red and hide their letters after half a second.",
            "Show a score counter in the top right, starting at zero.",
            "Show \"You won!\" in the middle of the screen once all pairs are found.",
        ],
        document: None,
    },
];

pub fn presets() -> &'static [TaskPreset] {
    PRESETS
}

pub fn find_preset(key: &str) -> Option<&'static TaskPreset> {
    PRESETS.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::format_html;

    #[test]
    fn test_find_preset() {
        assert_eq!(find_preset("camera").map(|p| p.name), Some("Cameras"));
        assert!(find_preset("chess").is_none());
        assert!(find_preset("none").unwrap().tasks.is_empty());
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = presets().iter().map(|p| p.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), presets().len());
    }

    #[test]
    fn test_camera_document_is_formattable() {
        assert!(format_html(CAMERA_DOCUMENT).is_ok());
    }
}
