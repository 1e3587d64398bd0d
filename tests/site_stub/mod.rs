use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// One listing page: the detail slugs it links, in order.
pub type Listing = BTreeMap<u32, Vec<&'static str>>;

/// Local stand-in for the video site: `/videos/{page}/` listing pages and
/// `/videos/{slug}/` detail pages. Everything else is a 404.
pub struct SiteStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SiteStub {
    pub fn spawn(listing: Listing) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start site stub server");
        let base_url = format!("http://{}", server.server_addr());
        let origin = base_url.clone();

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url);
                let segment = path
                    .strip_prefix("/videos/")
                    .map(|rest| rest.trim_end_matches('/'))
                    .unwrap_or_default();

                let body = match segment.parse::<u32>() {
                    Ok(page) => listing
                        .get(&page)
                        .map(|slugs| listing_page(&origin, slugs)),
                    Err(_) => segment.strip_prefix("clip-").map(detail_page),
                };

                let response = match body {
                    Some(html) => tiny_http::Response::from_string(html).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/html; charset=utf-8"[..],
                        )
                        .expect("build header"),
                    ),
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn listing_template(&self) -> String {
        format!(
            "{}/videos/{{page}}/?videos_per_page=32&sort_by=post_date",
            self.base_url
        )
    }
}

impl Drop for SiteStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn listing_page(origin: &str, slugs: &[&str]) -> String {
    let cards = slugs
        .iter()
        .map(|slug| {
            format!(
                r#"<div class="pb-item"><a class="pb-item-link pb-item-link-video" href="{origin}/videos/{slug}/">{slug}</a></div>"#
            )
        })
        .collect::<String>();
    format!(
        r#"<!doctype html>
<html>
  <body>
    <a class="pb-nav" href="{origin}/videos/1/">first</a>
    {cards}
  </body>
</html>
"#
    )
}

/// `clip-<id>` becomes a detail page whose video_id is `<id>`, numeric or not.
fn detail_page(id: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <script type="text/javascript">
      var pageContext = {{
        video_id: '{id}',
        video_title: 'Clip {id} / part\\one',
        video_models: 'Model {id}',
        video_categories: 'Alpha, Beta,'
      }};
    </script>
  </head>
  <body>
    <div class="pb-download-options">
      <a href="https://cdn.example.com/{id}/{id}_720p.mp4?download=true">720p</a>
      <a href="https://cdn.example.com/{id}/{id}.mp4">original</a>
    </div>
  </body>
</html>
"#
    )
}
