use crate::types::FanMode;

pub fn render_page(mode: FanMode, percent: u8) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Motor Control</title></head>
<body>
<h1>Motor Control</h1>
<p>Current Fan Power: <span id="current_setting">{percent}%</span></p>
<p>Current Mode Setting: <span id="current_mode">{mode}</span></p>
{controls}</body>
</html>
"#,
        percent = percent,
        mode = mode.as_str(),
        controls = mode_controls(mode),
    )
}

// the current mode is never its own button
fn mode_controls(mode: FanMode) -> String {
    match mode {
        FanMode::Override => format!(
            "{}{}",
            control_button("override_off", "Manual", "/manual"),
            control_button("power_off", "Power Off", "/off"),
        ),
        FanMode::Manual => format!(
            "{}{}",
            control_button("override_on", "Override", "/override"),
            control_button("power_off", "Power Off", "/off"),
        ),
        FanMode::Off => format!(
            "{}{}",
            control_button("override_off", "Manual", "/manual"),
            control_button("override_on", "Override", "/override"),
        ),
    }
}

fn control_button(id: &str, label: &str, path: &str) -> String {
    format!(
        r#"<button id="{id}">{label}</button>
<script>
    document.getElementById("{id}").onclick = function() {{
      var xhr = new XMLHttpRequest();
      xhr.open("GET", "{path}", true);
      xhr.send();
      xhr.onload = function() {{
        location.reload()
      }};
    }};
</script>
"#
    )
}
