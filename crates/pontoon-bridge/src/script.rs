//! JavaScript side of the bridge.
//!
//! Injected into the webview as an initialization script before the page
//! loads. `window.bridge` speaks the same envelope protocol as the Rust side:
//! `{channel, args}` out, `{channel, result}` / `{channel, error}` back in.

/// Init script establishing `window.bridge` inside the web content.
pub const BRIDGE_INIT_SCRIPT: &str = r#"
(function () {
  window.bridge = {
    invoke: function (channel, ...args) {
      return new Promise((resolve, reject) => {
        const handleMessage = (event) => {
          try {
            const data = JSON.parse(event.data);
            if (data.channel !== channel) return;
            window.chrome.webview.removeEventListener('message', handleMessage);
            if (data.error !== undefined) {
              reject(new Error(data.error));
            } else {
              resolve(data.result);
            }
          } catch (err) {
            window.chrome.webview.removeEventListener('message', handleMessage);
            reject(err);
          }
        };
        window.chrome.webview.addEventListener('message', handleMessage);
        window.chrome.webview.postMessage(JSON.stringify({ channel, args }));
      });
    },

    send: function (channel, ...args) {
      window.chrome.webview.postMessage(JSON.stringify({ channel, args }));
    },

    sendToHost: function (channel, ...args) {
      this.send(channel, ...args);
    },

    on: function (channel, listener) {
      const handleMessage = (event) => {
        try {
          const data = JSON.parse(event.data);
          if (data.channel === channel) {
            listener(event, data.args !== undefined ? data.args : data.result);
          }
        } catch (err) {
          // Undecodable frames are the host's problem to report.
        }
      };
      window.chrome.webview.addEventListener('message', handleMessage);
      return () => window.chrome.webview.removeEventListener('message', handleMessage);
    },

    once: function (channel, listener) {
      const off = this.on(channel, (event, payload) => {
        off();
        listener(event, payload);
      });
      return off;
    }
  };
})();
"#;

/// JS expression posting one envelope from the host into the page's message
/// listeners, for hosts that inject rather than post natively.
pub fn js_post_reply(channel: &str, result: &serde_json::Value) -> String {
    let channel = serde_json::to_string(channel).unwrap_or_else(|_| "\"error\"".to_string());
    let result = serde_json::to_string(result).unwrap_or_else(|_| "null".to_string());
    format!(
        "window.dispatchEvent(new MessageEvent('message', {{ data: JSON.stringify({{ channel: {channel}, result: {result} }}) }}));"
    )
}
