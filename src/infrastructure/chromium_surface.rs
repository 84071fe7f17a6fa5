//! 基于 Chromium 页面的界面适配器
//!
//! 所有查找字符串都来自 `UiSelectors`；页面上的具体操作通过注入的 JS 完成，
//! 文件上传和下载路由通过 CDP 命令完成。

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Timeouts, UiSelectors};
use crate::error::ProbeError;
use crate::infrastructure::js_executor::JsExecutor;
use crate::infrastructure::polling::{await_condition, WaitOutcome, WaitSpec};
use crate::infrastructure::surface::{
    ArtifactKind, ArtifactRequest, ArtifactStatus, Panel, ProbeResult, Retrieval, Surface,
};

/// 注入到每段脚本前面的查找工具
const PRELUDE: &str = r#"
const __nb = {
  visible(el) {
    if (!el) return false;
    const r = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
  },
  all(sel, root) {
    try { return Array.from((root || document).querySelectorAll(sel)); } catch (e) { return []; }
  },
  first(sel, root) {
    return __nb.all(sel, root).find(__nb.visible) || null;
  },
  label(el) {
    return ((el.getAttribute('aria-label') || '') + ' ' + (el.textContent || '')).trim().toLowerCase();
  },
  byLabel(labels, root) {
    const items = __nb.all('button, [role="button"], [role="menuitem"], [role="tab"], a', root).filter(__nb.visible);
    const wanted = labels.map(l => l.toLowerCase());
    for (const w of wanted) {
      const exact = items.find(el => (el.getAttribute('aria-label') || '').trim().toLowerCase() === w
        || (el.textContent || '').trim().toLowerCase() === w);
      if (exact) return exact;
    }
    for (const w of wanted) {
      const loose = items.find(el => __nb.label(el).includes(w));
      if (loose) return loose;
    }
    return null;
  },
  hasText(text) {
    const t = text.toLowerCase();
    return __nb.all('body *').some(el => el.children.length === 0 && __nb.visible(el)
      && (el.textContent || '').toLowerCase().includes(t));
  },
  click(el) {
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
  },
  setValue(el, value) {
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
  },
  container(el) {
    return el.closest('[class*="artifact"], mat-card, li, [role="listitem"]') || el.parentElement || el;
  },
};
"#;

fn script(body: &str) -> String {
    format!("(() => {{ {} {} }})()", PRELUDE, body)
}

#[derive(Debug, Deserialize)]
struct StatusProbe {
    state: String,
    #[serde(default)]
    detail: String,
}

/// 页面结构快照，界面改版后用来修正 `UiSelectors`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDiagnostics {
    pub url: String,
    pub buttons: Vec<ButtonInfo>,
    pub icons: Vec<String>,
    pub nav_items: Vec<String>,
    pub selectors: Vec<SelectorHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonInfo {
    pub text: String,
    pub aria_label: Option<String>,
    pub classes: String,
}

/// 某个配置项在当前页面上的命中情况
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorHit {
    pub name: String,
    pub matched: u32,
    pub visible: u32,
}

impl PageDiagnostics {
    /// 当前页面上一个都没命中的配置项
    pub fn misses(&self) -> impl Iterator<Item = &SelectorHit> {
        self.selectors.iter().filter(|hit| hit.matched == 0)
    }
}

/// Chromium 页面上的界面实现
pub struct ChromiumSurface {
    executor: JsExecutor,
    selectors: UiSelectors,
    timeouts: Timeouts,
    home_url: String,
    cancel: CancellationToken,
}

impl ChromiumSurface {
    pub fn new(
        executor: JsExecutor,
        selectors: UiSelectors,
        timeouts: Timeouts,
        home_url: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            selectors,
            timeouts,
            home_url: home_url.into(),
            cancel,
        }
    }

    /// 采集当前页面的按钮、图标和各选择器的命中数
    pub async fn diagnose(&self) -> ProbeResult<PageDiagnostics> {
        let css: Vec<_> = self
            .selectors
            .css_selectors()
            .into_iter()
            .map(|(name, selector)| json!({ "name": name, "css": selector }))
            .collect();
        let labels: Vec<_> = self
            .selectors
            .label_groups()
            .into_iter()
            .map(|(name, labels)| json!({ "name": name, "labels": labels }))
            .collect();
        let body = format!(
            r#"
            const selectors = {css}.map(s => {{
              const all = __nb.all(s.css);
              return {{ name: s.name, matched: all.length, visible: all.filter(__nb.visible).length }};
            }}).concat({labels}.map(g => {{
              const hit = __nb.byLabel(g.labels) ? 1 : 0;
              return {{ name: g.name, matched: hit, visible: hit }};
            }}));
            const buttons = __nb.all('button').map(b => ({{
              text: (b.innerText || '').trim().slice(0, 80),
              ariaLabel: b.getAttribute('aria-label'),
              classes: String(b.className || ''),
            }})).filter(b => b.text || b.ariaLabel).slice(0, 60);
            const icons = [...new Set(__nb.all('mat-icon').map(i => (i.innerText || '').trim()))].filter(Boolean).slice(0, 40);
            const navItems = __nb.all('[role="tab"], [role="menuitem"], mat-tab, .tab-label')
              .map(n => (n.innerText || '').trim()).filter(Boolean).slice(0, 30);
            return {{ url: location.href, buttons, icons, navItems, selectors }};
            "#,
            css = json!(css),
            labels = json!(labels),
        );
        self.executor.eval_as(script(&body)).await
    }

    async fn check(&self, body: &str) -> ProbeResult<bool> {
        self.executor.eval_as::<bool>(script(body)).await
    }

    /// 操作内部的短等待，超时视为界面暂未就绪
    async fn wait_until(&self, what: &str, body: &str, timeout_secs: u64) -> ProbeResult<()> {
        let js = script(body);
        let executor = &self.executor;
        let outcome = await_condition(
            move || executor.eval_as::<bool>(js.clone()),
            WaitSpec::secs(timeout_secs, self.timeouts.poll_interval()),
            &self.cancel,
        )
        .await
        .map_err(|e| ProbeError::Unavailable(e.reason))?;

        match outcome {
            WaitOutcome::Satisfied { .. } => Ok(()),
            WaitOutcome::TimedOut { elapsed } => Err(ProbeError::not_ready(format!(
                "等待{}超时 ({:?})",
                what, elapsed
            ))),
            WaitOutcome::Cancelled => Err(ProbeError::not_ready("已取消")),
        }
    }

    /// 点击脚本返回 false 时视为元素未出现
    async fn click(&self, what: &str, body: &str) -> ProbeResult<()> {
        if self.check(body).await? {
            debug!("点击: {}", what);
            Ok(())
        } else {
            Err(ProbeError::not_ready(format!("未找到{}", what)))
        }
    }

    async fn click_label(&self, what: &str, labels: &[String]) -> ProbeResult<()> {
        let body = format!("return __nb.click(__nb.byLabel({}));", json!(labels));
        self.click(what, &body).await
    }

    fn format_edit_selector(&self, format: &str) -> String {
        self.selectors.format_edit_button.replace("{name}", format)
    }

    async fn request_report(&self, format: &str, prompt: &str) -> ProbeResult<()> {
        let selectors = &self.selectors;
        if !self.panel_open(Panel::ReportPicker).await? {
            self.open_panel(Panel::ReportPicker).await?;
        }

        let edit = json!(self.format_edit_selector(format));
        self.wait_until(
            &format!("格式「{}」出现", format),
            &format!("return !!__nb.first({});", edit),
            self.timeouts.format_offer_secs,
        )
        .await?;
        self.click(
            &format!("格式「{}」的编辑按钮", format),
            &format!("return __nb.click(__nb.first({}));", edit),
        )
        .await?;

        let textarea = json!(selectors.description_textarea);
        self.wait_until(
            "描述输入框",
            &format!("return !!__nb.first({});", textarea),
            self.timeouts.panel_secs,
        )
        .await?;
        let append = format!(
            "const el = __nb.first({t}); if (!el) return false; \
             __nb.setValue(el, (el.value || '').trimEnd() + ' ' + {p}); return true;",
            t = textarea,
            p = json!(prompt),
        );
        self.click("描述输入框", &append).await?;

        let generate = format!(
            "const dialog = __nb.first({d}); return __nb.click(__nb.byLabel({l}, dialog || document));",
            d = json!(selectors.dialog),
            l = json!(selectors.generate_labels),
        );
        self.click("生成按钮", &generate).await
    }

    async fn request_audio(
        &self,
        format: Option<&str>,
        length: Option<&str>,
        focus_prompt: &str,
    ) -> ProbeResult<()> {
        let selectors = &self.selectors;
        let customize = json!(selectors.audio_customize);
        self.wait_until(
            "音频自定义按钮",
            &format!("return !!__nb.first({});", customize),
            self.timeouts.panel_secs,
        )
        .await?;
        self.click(
            "音频自定义按钮",
            &format!("return __nb.click(__nb.first({}));", customize),
        )
        .await?;

        let dialog = json!(selectors.dialog);
        self.wait_until(
            "音频设置对话框",
            &format!("return !!__nb.first({});", dialog),
            self.timeouts.panel_secs,
        )
        .await?;

        // 选项缺失不算错误
        for option in [format, length].into_iter().flatten() {
            let body = format!(
                "return __nb.click(__nb.byLabel([{o}], __nb.first({d}) || document));",
                o = json!(option),
                d = dialog,
            );
            if !self.check(&body).await? {
                debug!("音频选项「{}」不存在，跳过", option);
            }
        }

        let prompt = format!(
            "const el = __nb.first({t}, __nb.first({d}) || document); if (!el) return false; \
             __nb.setValue(el, {p}); return true;",
            t = json!(selectors.description_textarea),
            d = dialog,
            p = json!(focus_prompt),
        );
        if !self.check(&prompt).await? {
            debug!("未找到音频提示词输入框，跳过");
        }

        let generate = format!(
            "return __nb.click(__nb.byLabel({l}, __nb.first({d}) || document));",
            l = json!(selectors.generate_labels),
            d = dialog,
        );
        self.click("音频生成按钮", &generate).await
    }

    async fn report_text(&self, format: &str) -> ProbeResult<String> {
        let selectors = &self.selectors;
        let open = format!(
            "const f = {f}.toLowerCase(); \
             const el = __nb.all({a}).filter(__nb.visible).find(e => __nb.label(__nb.container(e)).includes(f)); \
             return __nb.click(el);",
            f = json!(format),
            a = json!(selectors.artifact_item),
        );
        self.click(&format!("报告「{}」", format), &open).await?;

        let body_sel = json!(selectors.artifact_body);
        self.wait_until(
            "报告正文",
            &format!("const el = __nb.first({}); return !!el && el.innerText.trim().length > 0;", body_sel),
            self.timeouts.panel_secs,
        )
        .await?;
        let text: String = self
            .executor
            .eval_as(script(&format!(
                "const el = __nb.first({}); return el ? el.innerText : '';",
                body_sel
            )))
            .await?;

        // 关闭正文视图；找不到关闭按钮不影响结果
        let close = format!(
            "return __nb.click(__nb.byLabel({}));",
            json!(selectors.close_labels)
        );
        if let Err(err) = self.check(&close).await {
            let reason = err.escalate()?;
            debug!("关闭正文视图失败，忽略: {}", reason);
        }
        Ok(text)
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    async fn session_ready(&self) -> ProbeResult<bool> {
        let url = self.executor.current_url().await?;
        if !url.contains(&self.selectors.app_url_fragment) {
            return Ok(false);
        }
        self.check("return document.readyState === 'complete';").await
    }

    async fn create_workspace(&self) -> ProbeResult<()> {
        self.wait_until(
            "主页加载",
            &format!("return !!__nb.first({});", json!(self.selectors.home_marker)),
            self.timeouts.panel_secs,
        )
        .await?;
        self.click_label("新建工作区按钮", &self.selectors.new_workspace_labels)
            .await
    }

    async fn workspace_open(&self) -> ProbeResult<bool> {
        let url = self.executor.current_url().await?;
        Ok(url.contains(&self.selectors.workspace_url_fragment))
    }

    async fn name_workspace(&self, title: &str) -> ProbeResult<()> {
        let body = format!(
            "const el = __nb.first({s}); if (!el) return false; el.focus(); __nb.setValue(el, {t}); \
             el.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Enter', bubbles: true }})); \
             el.blur(); return true;",
            s = json!(self.selectors.title_input),
            t = json!(title),
        );
        self.click("标题输入框", &body).await
    }

    async fn submit_source(&self, path: &Path) -> ProbeResult<()> {
        let selectors = &self.selectors;
        let input = json!(selectors.file_input);
        let has_input = format!("return __nb.all({}).length > 0;", input);

        if !self.check(&has_input).await? {
            self.click_label("添加资料按钮", &selectors.add_source_labels)
                .await?;
            // 有的界面版本需要再选择一次"上传文件"
            let choice = format!(
                "return __nb.click(__nb.byLabel({}));",
                json!(selectors.upload_choice_labels)
            );
            let _ = self.check(&choice).await?;
            self.wait_until("文件输入框", &has_input, self.timeouts.panel_secs)
                .await?;
        }

        self.executor
            .set_input_files(&selectors.file_input, &[path])
            .await?;

        // 部分界面版本需要确认，没有确认按钮时文件输入本身就足够
        let confirm = format!(
            "return __nb.click(__nb.byLabel({}, __nb.first({}) || document));",
            json!(selectors.insert_labels),
            json!(selectors.dialog),
        );
        if !self.check(&confirm).await? {
            debug!("没有上传确认按钮");
        }
        Ok(())
    }

    async fn source_indexed(&self, path: &Path) -> ProbeResult<bool> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let body = format!(
            "const name = {n}; \
             const listed = __nb.all({i}).some(el => (el.textContent || '').toLowerCase().includes(name)); \
             const loading = __nb.all({l}).some(__nb.visible); \
             return listed && !loading;",
            n = json!(name),
            i = json!(self.selectors.source_item),
            l = json!(self.selectors.source_loading),
        );
        self.check(&body).await
    }

    async fn panel_open(&self, panel: Panel) -> ProbeResult<bool> {
        let body = match panel {
            Panel::Studio => format!(
                "return __nb.hasText({});",
                json!(self.selectors.studio_anchor_text)
            ),
            Panel::ReportPicker => format!(
                "const d = __nb.first({}); return !!d && (d.textContent || '').includes({});",
                json!(self.selectors.dialog),
                json!(self.selectors.report_picker_marker),
            ),
        };
        self.check(&body).await
    }

    async fn open_panel(&self, panel: Panel) -> ProbeResult<()> {
        match panel {
            Panel::Studio => {
                self.click_label("Studio 切换按钮", &self.selectors.studio_toggle_labels)
                    .await
            }
            Panel::ReportPicker => {
                self.click_label("报告卡片", &self.selectors.reports_card_labels)
                    .await
            }
        }
    }

    async fn offered_formats(&self) -> ProbeResult<Vec<String>> {
        let body = format!(
            "const d = __nb.first({d}); if (!d) return []; const prefix = {p}; \
             const names = __nb.all('button', d) \
               .map(b => b.getAttribute('aria-label') || b.getAttribute('mattooltip') || '') \
               .filter(l => l.startsWith(prefix)) \
               .map(l => l.slice(prefix.length).trim()); \
             return Array.from(new Set(names));",
            d = json!(self.selectors.dialog),
            p = json!(self.selectors.format_edit_label_prefix),
        );
        self.executor.eval_as(script(&body)).await
    }

    async fn request_artifact(&self, request: &ArtifactRequest) -> ProbeResult<()> {
        match request {
            ArtifactRequest::Report { format, prompt } => self.request_report(format, prompt).await,
            ArtifactRequest::Audio {
                format,
                length,
                focus_prompt,
            } => {
                self.request_audio(format.as_deref(), length.as_deref(), focus_prompt)
                    .await
            }
        }
    }

    async fn artifact_status(&self, kind: &ArtifactKind) -> ProbeResult<ArtifactStatus> {
        let selectors = &self.selectors;
        let body = match kind {
            ArtifactKind::Report(format) => format!(
                "const f = {f}.toLowerCase(); \
                 const near = sel => __nb.all(sel).filter(__nb.visible) \
                   .find(e => __nb.label(__nb.container(e)).includes(f)); \
                 const failed = near({x}); \
                 if (failed) return {{ state: 'failed', detail: (failed.textContent || '').trim() }}; \
                 if (near({g})) return {{ state: 'generating' }}; \
                 if (near({a})) return {{ state: 'completed' }}; \
                 return {{ state: 'absent' }};",
                f = json!(format),
                x = json!(selectors.artifact_failed),
                g = json!(selectors.artifact_generating),
                a = json!(selectors.artifact_item),
            ),
            ArtifactKind::Audio => format!(
                "const near = sel => __nb.all(sel).filter(__nb.visible) \
                   .find(e => __nb.label(__nb.container(e)).includes('audio')); \
                 const failed = near({x}); \
                 if (failed) return {{ state: 'failed', detail: (failed.textContent || '').trim() }}; \
                 if (__nb.first({d}) || __nb.first({p})) return {{ state: 'completed' }}; \
                 if (near({g})) return {{ state: 'generating' }}; \
                 return {{ state: 'absent' }};",
                x = json!(selectors.artifact_failed),
                d = json!(selectors.audio_download),
                p = json!(selectors.audio_player),
                g = json!(selectors.artifact_generating),
            ),
        };

        let probe: StatusProbe = self.executor.eval_as(script(&body)).await?;
        Ok(match probe.state.as_str() {
            "completed" => ArtifactStatus::Completed,
            "generating" => ArtifactStatus::Generating,
            "failed" => ArtifactStatus::Failed(probe.detail),
            _ => ArtifactStatus::Absent,
        })
    }

    async fn retrieve_artifact(&self, kind: &ArtifactKind, dest_dir: &Path) -> ProbeResult<Retrieval> {
        match kind {
            ArtifactKind::Report(format) => {
                let text = self.report_text(format).await?;
                Ok(Retrieval::Content {
                    file_name: format!("{}.md", format),
                    bytes: text.into_bytes(),
                })
            }
            ArtifactKind::Audio => {
                self.executor.route_downloads(dest_dir).await?;
                let body = format!(
                    "return __nb.click(__nb.first({}));",
                    json!(self.selectors.audio_download)
                );
                self.click("音频下载按钮", &body).await?;
                Ok(Retrieval::Download)
            }
        }
    }

    async fn obstruction_present(&self) -> ProbeResult<bool> {
        self.check(&format!(
            "return __nb.all({}).some(__nb.visible);",
            json!(self.selectors.overlay)
        ))
        .await
    }

    async fn force_dismiss_obstruction(&self) -> ProbeResult<()> {
        let body = format!(
            "const target = document.activeElement || document.body; \
             target.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Escape', bubbles: true }})); \
             const overlays = __nb.all({o}).filter(__nb.visible); \
             overlays.forEach(el => el.click()); \
             overlays.forEach(el => {{ el.style.pointerEvents = 'none'; }}); \
             return true;",
            o = json!(self.selectors.overlay),
        );
        self.check(&body).await.map(|_| ())
    }

    async fn return_home(&self) -> ProbeResult<()> {
        self.executor.goto(&self.home_url).await
    }
}
