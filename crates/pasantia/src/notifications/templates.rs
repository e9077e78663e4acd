//! Fixed HTML templates filled by placeholder substitution.

const CREATED_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Solicitud recibida</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #1d4ed8;">Hemos recibido su solicitud</h2>
        <p>Su solicitud de certificación de exención de pasantía fue registrada con el número:</p>
        <p style="font-size: 22px; font-weight: bold;">{{numero}}</p>
        <p>Conserve este número para consultar el estado de su solicitud:</p>
        <p><a href="{{url}}">{{url}}</a></p>
    </div>
</body>
</html>
"#;

const STATUS_UPDATED_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Actualización de su solicitud</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #1d4ed8;">Su solicitud {{numero}} fue actualizada</h2>
        <p>Nuevo estado: <strong>{{estado}}</strong></p>
        {{comentario}}
        <p>Puede ver el detalle en: <a href="{{url}}">{{url}}</a></p>
    </div>
</body>
</html>
"#;

const RETURNED_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Solicitud devuelta para corrección</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #b45309;">Su solicitud {{numero}} requiere correcciones</h2>
        <div style="background-color: #fffbeb; border-left: 4px solid #b45309; padding: 15px; margin: 20px 0;">
            <p style="margin: 0;">{{comentario}}</p>
        </div>
        <p>Ingrese al siguiente enlace para cargar nuevamente sus documentos:</p>
        <p><a href="{{url}}">{{url}}</a></p>
    </div>
</body>
</html>
"#;

/// Applicant-facing email templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTemplate {
    Created {
        number: String,
        status_url: String,
    },
    StatusUpdated {
        number: String,
        state_label: String,
        comment: Option<String>,
        status_url: String,
    },
    ReturnedForCorrection {
        number: String,
        comment: String,
        status_url: String,
    },
}

impl NotificationTemplate {
    pub fn subject(&self) -> String {
        match self {
            NotificationTemplate::Created { number, .. } => {
                format!("Solicitud {number} recibida")
            }
            NotificationTemplate::StatusUpdated { number, .. } => {
                format!("Actualización de la solicitud {number}")
            }
            NotificationTemplate::ReturnedForCorrection { number, .. } => {
                format!("Solicitud {number} devuelta para corrección")
            }
        }
    }

    pub fn render(&self) -> String {
        match self {
            NotificationTemplate::Created { number, status_url } => CREATED_TEMPLATE
                .replace("{{numero}}", &escape_html(number))
                .replace("{{url}}", &escape_html(status_url)),
            NotificationTemplate::StatusUpdated {
                number,
                state_label,
                comment,
                status_url,
            } => {
                let comment_block = comment
                    .as_deref()
                    .map(|text| format!("<p>Observación: {}</p>", escape_html(text)))
                    .unwrap_or_default();
                STATUS_UPDATED_TEMPLATE
                    .replace("{{numero}}", &escape_html(number))
                    .replace("{{estado}}", &escape_html(state_label))
                    .replace("{{comentario}}", &comment_block)
                    .replace("{{url}}", &escape_html(status_url))
            }
            NotificationTemplate::ReturnedForCorrection {
                number,
                comment,
                status_url,
            } => RETURNED_TEMPLATE
                .replace("{{numero}}", &escape_html(number))
                .replace("{{comentario}}", &escape_html(comment))
                .replace("{{url}}", &escape_html(status_url)),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_template_carries_number_and_link() {
        let template = NotificationTemplate::Created {
            number: "2602001".to_string(),
            status_url: "https://registro.local/consulta/2602001".to_string(),
        };
        let html = template.render();
        assert!(html.contains("2602001"));
        assert!(html.contains("https://registro.local/consulta/2602001"));
        assert!(!html.contains("{{"));
        assert_eq!(template.subject(), "Solicitud 2602001 recibida");
    }

    #[test]
    fn correction_comment_is_escaped() {
        let html = NotificationTemplate::ReturnedForCorrection {
            number: "2602001".to_string(),
            comment: "Falta firma <b>y sello</b>".to_string(),
            status_url: "https://registro.local/consulta/2602001".to_string(),
        }
        .render();
        assert!(html.contains("Falta firma &lt;b&gt;y sello&lt;/b&gt;"));
    }

    #[test]
    fn status_update_omits_empty_comment_block() {
        let html = NotificationTemplate::StatusUpdated {
            number: "2602001".to_string(),
            state_label: "Aprobada".to_string(),
            comment: None,
            status_url: "https://registro.local/consulta/2602001".to_string(),
        }
        .render();
        assert!(html.contains("Aprobada"));
        assert!(!html.contains("Observación"));
        assert!(!html.contains("{{"));
    }
}
