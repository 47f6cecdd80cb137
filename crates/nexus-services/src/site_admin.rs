//! Operations on a freshly created tenant site, performed through its RPC surface while
//! logged in as the site's Administrator.

use async_trait::async_trait;
use nexus_core::models::{ApiCredentials, Plan};
use nexus_core::AppError;
use serde_json::json;
use std::fmt;

use crate::erp::{ErpAuth, ErpClient, ErpError};

const ADMIN_ROLE: &str = "System Manager";
const SETTINGS_DOCTYPE: &str = "SaaS Settings";
const ADMINISTRATOR: &str = "Administrator";

/// Where and how to reach a tenant site.
#[derive(Clone)]
pub struct SiteLogin {
    pub site_name: String,
    pub administrator_password: String,
}

impl fmt::Debug for SiteLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteLogin")
            .field("site_name", &self.site_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AdminUser {
    pub email: String,
    pub first_name: String,
    pub password: String,
}

impl fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUser")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SiteAdmin: Send + Sync {
    /// Create the tenant's admin user if absent, (re)set its password and grant the admin
    /// role. An existing user is success.
    async fn ensure_admin_user(&self, site: &SiteLogin, admin: &AdminUser) -> Result<(), AppError>;

    /// Store the API pair on the admin user's record, replacing any previous pair.
    async fn set_api_credentials(
        &self,
        site: &SiteLogin,
        user_email: &str,
        credentials: &ApiCredentials,
    ) -> Result<(), AppError>;

    /// Replace a live user's API pair, authenticating with the pair being replaced.
    async fn rotate_api_credentials(
        &self,
        site_name: &str,
        user_email: &str,
        current: &ApiCredentials,
        replacement: &ApiCredentials,
    ) -> Result<(), AppError>;

    /// Write plan limits into the site's settings document.
    async fn apply_plan_settings(
        &self,
        site: &SiteLogin,
        organization_name: &str,
        plan: Plan,
    ) -> Result<(), AppError>;
}

/// `SiteAdmin` over the ERP RPC surface, addressing each site by host header.
#[derive(Clone)]
pub struct ErpSiteAdmin {
    erp_url: String,
}

impl ErpSiteAdmin {
    pub fn new(erp_url: impl Into<String>) -> Self {
        Self {
            erp_url: erp_url.into(),
        }
    }

    async fn session(&self, site: &SiteLogin) -> Result<ErpClient, AppError> {
        let client = ErpClient::new(
            self.erp_url.clone(),
            Some(site.site_name.clone()),
            ErpAuth::Session {
                user: ADMINISTRATOR.to_string(),
                password: site.administrator_password.clone(),
            },
        )?;
        client.login().await.map_err(|e| {
            tracing::warn!(site = %site.site_name, error = %e, "Administrator login failed");
            AppError::from(e)
        })?;
        Ok(client)
    }
}

#[async_trait]
impl SiteAdmin for ErpSiteAdmin {
    #[tracing::instrument(skip(self, admin), fields(site = %site.site_name, user = %admin.email))]
    async fn ensure_admin_user(&self, site: &SiteLogin, admin: &AdminUser) -> Result<(), AppError> {
        let client = self.session(site).await?;

        let created = match client.get_optional("User", &admin.email).await? {
            Some(_) => false,
            None => {
                let insert = client
                    .insert(json!({
                        "doctype": "User",
                        "email": admin.email,
                        "first_name": admin.first_name,
                        "enabled": 1,
                        "new_password": admin.password,
                        "send_welcome_email": 0,
                    }))
                    .await;
                match insert {
                    Ok(_) => true,
                    Err(ErpError::DuplicateEntry(_)) => false,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if !created {
            client
                .set_value("User", &admin.email, "new_password", json!(admin.password))
                .await?;
        }

        let has_role = client
            .get_count(
                "Has Role",
                json!({ "parent": admin.email, "role": ADMIN_ROLE }),
            )
            .await?;
        if has_role == 0 {
            let grant = client
                .insert(json!({
                    "doctype": "Has Role",
                    "parent": admin.email,
                    "parenttype": "User",
                    "parentfield": "roles",
                    "role": ADMIN_ROLE,
                }))
                .await;
            match grant {
                Ok(_) | Err(ErpError::DuplicateEntry(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(created, "Admin user configured");
        Ok(())
    }

    #[tracing::instrument(skip(self, credentials), fields(site = %site.site_name))]
    async fn set_api_credentials(
        &self,
        site: &SiteLogin,
        user_email: &str,
        credentials: &ApiCredentials,
    ) -> Result<(), AppError> {
        let client = self.session(site).await?;
        client
            .set_values(
                "User",
                user_email,
                json!({
                    "api_key": credentials.api_key,
                    "api_secret": credentials.api_secret,
                }),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, current, replacement))]
    async fn rotate_api_credentials(
        &self,
        site_name: &str,
        user_email: &str,
        current: &ApiCredentials,
        replacement: &ApiCredentials,
    ) -> Result<(), AppError> {
        let client = ErpClient::new(
            self.erp_url.clone(),
            Some(site_name.to_string()),
            ErpAuth::Token {
                api_key: current.api_key.clone(),
                api_secret: current.api_secret.clone(),
            },
        )?;
        client
            .set_values(
                "User",
                user_email,
                json!({
                    "api_key": replacement.api_key,
                    "api_secret": replacement.api_secret,
                }),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(site = %site.site_name))]
    async fn apply_plan_settings(
        &self,
        site: &SiteLogin,
        organization_name: &str,
        plan: Plan,
    ) -> Result<(), AppError> {
        let client = self.session(site).await?;
        let fields = json!({
            "organization_name": organization_name,
            "plan_type": plan.label(),
            "max_users": plan.max_users(),
        });

        if client
            .get_optional(SETTINGS_DOCTYPE, organization_name)
            .await?
            .is_some()
        {
            client
                .set_values(SETTINGS_DOCTYPE, organization_name, fields)
                .await?;
        } else {
            let mut doc = fields;
            doc["doctype"] = json!(SETTINGS_DOCTYPE);
            client.insert(doc).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn login() -> SiteLogin {
        SiteLogin {
            site_name: "acme.localhost".to_string(),
            administrator_password: "bootstrap".to_string(),
        }
    }

    fn admin() -> AdminUser {
        AdminUser {
            email: "owner@acme.test".to_string(),
            first_name: "Owner".to_string(),
            password: "bootstrap".to_string(),
        }
    }

    async fn mock_login(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/api/method/login")
            .match_header("x-frappe-site-name", "acme.localhost")
            .with_status(200)
            .with_header("set-cookie", "sid=s1; Path=/")
            .with_body(r#"{"message": "Logged In"}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_creates_missing_user_and_grants_role() {
        let mut server = mockito::Server::new_async().await;
        let _login = mock_login(&mut server).await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(404)
            .with_body(r#"{"exc_type": "DoesNotExistError"}"#)
            .create_async()
            .await;
        let insert_user = server
            .mock("POST", "/api/method/frappe.client.insert")
            .match_body(Matcher::PartialJson(json!({
                "doc": {"doctype": "User", "email": "owner@acme.test", "send_welcome_email": 0}
            })))
            .with_status(200)
            .with_body(r#"{"message": {"name": "owner@acme.test"}}"#)
            .expect(1)
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get_count")
            .with_status(200)
            .with_body(r#"{"message": 0}"#)
            .create_async()
            .await;
        let grant_role = server
            .mock("POST", "/api/method/frappe.client.insert")
            .match_body(Matcher::PartialJson(json!({
                "doc": {"doctype": "Has Role", "role": "System Manager"}
            })))
            .with_status(200)
            .with_body(r#"{"message": {"name": "r1"}}"#)
            .expect(1)
            .create_async()
            .await;
        let set_password = server
            .mock("POST", "/api/method/frappe.client.set_value")
            .expect(0)
            .create_async()
            .await;

        ErpSiteAdmin::new(server.url())
            .ensure_admin_user(&login(), &admin())
            .await
            .unwrap();

        insert_user.assert_async().await;
        grant_role.assert_async().await;
        set_password.assert_async().await;
    }

    #[tokio::test]
    async fn test_existing_user_gets_password_reset() {
        let mut server = mockito::Server::new_async().await;
        let _login = mock_login(&mut server).await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(r#"{"message": {"name": "owner@acme.test"}}"#)
            .create_async()
            .await;
        let set_password = server
            .mock("POST", "/api/method/frappe.client.set_value")
            .match_body(Matcher::PartialJson(json!({"fieldname": "new_password"})))
            .with_status(200)
            .with_body(r#"{"message": {}}"#)
            .expect(1)
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get_count")
            .with_status(200)
            .with_body(r#"{"message": 1}"#)
            .create_async()
            .await;
        let inserts = server
            .mock("POST", "/api/method/frappe.client.insert")
            .expect(0)
            .create_async()
            .await;

        ErpSiteAdmin::new(server.url())
            .ensure_admin_user(&login(), &admin())
            .await
            .unwrap();

        set_password.assert_async().await;
        inserts.assert_async().await;
    }

    #[tokio::test]
    async fn test_rotation_authenticates_with_current_pair() {
        let mut server = mockito::Server::new_async().await;
        let write = server
            .mock("POST", "/api/method/frappe.client.set_value")
            .match_header("authorization", "token old-key:old-secret")
            .match_header("x-frappe-site-name", "acme.localhost")
            .match_body(Matcher::PartialJson(json!({
                "doctype": "User",
                "name": "owner@acme.test",
            })))
            .with_status(200)
            .with_body(r#"{"message": {"name": "owner@acme.test"}}"#)
            .expect(1)
            .create_async()
            .await;

        let current = ApiCredentials {
            api_key: "old-key".to_string(),
            api_secret: "old-secret".to_string(),
        };
        let replacement = ApiCredentials {
            api_key: "new-key".to_string(),
            api_secret: "new-secret".to_string(),
        };
        ErpSiteAdmin::new(server.url())
            .rotate_api_credentials("acme.localhost", "owner@acme.test", &current, &replacement)
            .await
            .unwrap();
        write.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_administrator_password_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/login")
            .with_status(401)
            .with_body(r#"{"exc_type": "AuthenticationError", "message": "Invalid login credentials"}"#)
            .create_async()
            .await;

        let err = ErpSiteAdmin::new(server.url())
            .ensure_admin_user(&login(), &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
